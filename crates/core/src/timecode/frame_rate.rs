use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TimecodeError;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Supported LTC frame rates.
///
/// 29.97 is counted non-drop: frame labels run 00..29 like 30 fps, only the
/// wall-clock duration of a frame differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrameRate {
    #[serde(rename = "24")]
    Fps24,
    #[default]
    #[serde(rename = "25")]
    Fps25,
    #[serde(rename = "29.97")]
    Fps2997,
    #[serde(rename = "30")]
    Fps30,
}

impl FrameRate {
    pub const ALL: [FrameRate; 4] = [
        FrameRate::Fps24,
        FrameRate::Fps25,
        FrameRate::Fps2997,
        FrameRate::Fps30,
    ];

    /// Number of frame labels per second (the `FF` field runs `0..nominal`).
    pub fn nominal(&self) -> u32 {
        match self {
            Self::Fps24 => 24,
            Self::Fps25 => 25,
            Self::Fps2997 | Self::Fps30 => 30,
        }
    }

    /// Frames per second as a rational `(numerator, denominator)`.
    fn ratio(&self) -> (u128, u128) {
        match self {
            Self::Fps24 => (24, 1),
            Self::Fps25 => (25, 1),
            Self::Fps2997 => (30_000, 1_001),
            Self::Fps30 => (30, 1),
        }
    }

    /// Total frames in 24 hours, the modulus for wraparound.
    pub fn frames_per_day(&self) -> i64 {
        self.nominal() as i64 * 86_400
    }

    /// Wall-clock length of one frame.
    pub fn frame_duration(&self) -> Duration {
        let (num, den) = self.ratio();
        Duration::from_nanos((NANOS_PER_SEC * den / num) as u64)
    }

    /// Whole frames elapsed in `elapsed` (floor).
    pub fn frames_in(&self, elapsed: Duration) -> i64 {
        let (num, den) = self.ratio();
        (elapsed.as_nanos() * num / (den * NANOS_PER_SEC)) as i64
    }

    /// Value passed to the encoder's `-f` flag.
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Fps24 => "24",
            Self::Fps25 => "25",
            Self::Fps2997 => "29.97",
            Self::Fps30 => "30",
        }
    }

    pub fn parse(text: &str) -> Result<Self, TimecodeError> {
        Self::ALL
            .into_iter()
            .find(|rate| rate.as_arg() == text.trim())
            .ok_or_else(|| TimecodeError::UnsupportedFrameRate(text.to_string()))
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}fps", self.as_arg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_in_whole_seconds() {
        assert_eq!(FrameRate::Fps25.frames_in(Duration::from_secs(2)), 50);
        assert_eq!(FrameRate::Fps24.frames_in(Duration::from_secs(1)), 24);
        assert_eq!(FrameRate::Fps30.frames_in(Duration::from_millis(999)), 29);
    }

    #[test]
    fn test_frames_in_is_floored() {
        // 39.999ms is just short of one frame at 25fps
        assert_eq!(FrameRate::Fps25.frames_in(Duration::from_micros(39_999)), 0);
        assert_eq!(FrameRate::Fps25.frames_in(Duration::from_millis(40)), 1);
    }

    #[test]
    fn test_ntsc_runs_slower_than_thirty() {
        // 1001 seconds at 29.97 is exactly 30000 frames
        assert_eq!(
            FrameRate::Fps2997.frames_in(Duration::from_secs(1001)),
            30_000
        );
        assert_eq!(FrameRate::Fps2997.nominal(), 30);
    }

    #[test]
    fn test_frame_duration() {
        assert_eq!(FrameRate::Fps25.frame_duration(), Duration::from_millis(40));
        assert_eq!(
            FrameRate::Fps2997.frame_duration(),
            Duration::from_nanos(33_366_666)
        );
    }

    #[test]
    fn test_parse_and_arg() {
        assert_eq!(FrameRate::parse("29.97").unwrap(), FrameRate::Fps2997);
        assert_eq!(FrameRate::parse(" 25 ").unwrap(), FrameRate::Fps25);
        assert!(FrameRate::parse("50").is_err());
        assert_eq!(FrameRate::default(), FrameRate::Fps25);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&FrameRate::Fps2997).unwrap();
        assert_eq!(json, "\"29.97\"");
        let rate: FrameRate = serde_json::from_str("\"24\"").unwrap();
        assert_eq!(rate, FrameRate::Fps24);
    }
}
