use std::fmt;

use chrono::Timelike;

use super::frame_rate::FrameRate;
use crate::error::TimecodeError;

/// An SMPTE `HH:MM:SS:FF` value at a fixed frame rate.
///
/// Always within a single day: hours `0..24`, minutes and seconds `0..60`,
/// frames `0..frame_rate.nominal()`. Arithmetic wraps at 24 hours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeCode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
    pub frame_rate: FrameRate,
}

impl TimeCode {
    pub fn new(
        hours: u32,
        minutes: u32,
        seconds: u32,
        frames: u32,
        frame_rate: FrameRate,
    ) -> Result<Self, TimecodeError> {
        check_range("hours", hours, 24)?;
        check_range("minutes", minutes, 60)?;
        check_range("seconds", seconds, 60)?;
        check_range("frames", frames, frame_rate.nominal())?;

        Ok(Self {
            hours,
            minutes,
            seconds,
            frames,
            frame_rate,
        })
    }

    pub fn zero(frame_rate: FrameRate) -> Self {
        Self {
            hours: 0,
            minutes: 0,
            seconds: 0,
            frames: 0,
            frame_rate,
        }
    }

    /// Parse the strict `DD:DD:DD:DD` form. Every field must be exactly two
    /// digits and in range for `frame_rate`.
    pub fn parse(text: &str, frame_rate: FrameRate) -> Result<Self, TimecodeError> {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() != 4
            || parts
                .iter()
                .any(|p| p.len() != 2 || !p.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(TimecodeError::Malformed(text.to_string()));
        }

        let field = |i: usize| -> u32 {
            let b = parts[i].as_bytes();
            (b[0] - b'0') as u32 * 10 + (b[1] - b'0') as u32
        };

        Self::new(field(0), field(1), field(2), field(3), frame_rate)
    }

    /// Time of day at whole-second precision, frames zero.
    pub fn from_time_of_day<T: Timelike>(time: &T, frame_rate: FrameRate) -> Self {
        Self {
            hours: time.hour(),
            minutes: time.minute(),
            // leap seconds show up as 60 in chrono
            seconds: time.second().min(59),
            frames: 0,
            frame_rate,
        }
    }

    pub fn to_frame_count(&self) -> i64 {
        let seconds = self.hours as i64 * 3600 + self.minutes as i64 * 60 + self.seconds as i64;
        seconds * self.frame_rate.nominal() as i64 + self.frames as i64
    }

    /// Build a timecode from a frame count, wrapping modulo one day. Negative
    /// counts wrap backwards from midnight.
    pub fn from_frame_count(count: i64, frame_rate: FrameRate) -> Self {
        let fps = frame_rate.nominal() as i64;
        let total = count.rem_euclid(frame_rate.frames_per_day());

        Self {
            hours: (total / (fps * 3600)) as u32,
            minutes: (total / (fps * 60) % 60) as u32,
            seconds: (total / fps % 60) as u32,
            frames: (total % fps) as u32,
            frame_rate,
        }
    }

    pub fn advance(&self, frames: i64) -> Self {
        // reduce first so huge deltas cannot overflow
        let delta = frames.rem_euclid(self.frame_rate.frames_per_day());
        Self::from_frame_count(self.to_frame_count() + delta, self.frame_rate)
    }
}

impl fmt::Display for TimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

fn check_range(field: &'static str, value: u32, limit: u32) -> Result<(), TimecodeError> {
    if value < limit {
        Ok(())
    } else {
        Err(TimecodeError::OutOfRange {
            field,
            value,
            max: limit - 1,
        })
    }
}
