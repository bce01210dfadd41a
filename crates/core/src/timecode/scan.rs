//! Timecode extraction from free-form decoder output.
//!
//! Grammar: the first substring matching `[0-9]{2}:[0-9]{2}:[0-9]{2}:[0-9]{2}`
//! (ASCII digits only), scanning left to right. Nothing else on the line is
//! interpreted, so the decoder may prefix or suffix the token with user bits,
//! dates or sample offsets.

use std::sync::LazyLock;

use regex::Regex;

use super::frame_rate::FrameRate;
use super::timecode::TimeCode;
use crate::error::TimecodeError;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]{2}:[0-9]{2}:[0-9]{2}:[0-9]{2}").expect("valid token pattern")
});

/// The first timecode-shaped token on `line`, if any.
pub fn find_token(line: &str) -> Option<&str> {
    TOKEN.find(line).map(|m| m.as_str())
}

/// Extract and parse the first token on `line`.
///
/// `None` when the line carries no token; `Some(Err(_))` when the first token
/// is shaped right but out of range for `frame_rate`.
pub fn scan_line(line: &str, frame_rate: FrameRate) -> Option<Result<TimeCode, TimecodeError>> {
    find_token(line).map(|token| TimeCode::parse(token, frame_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_embedded_token() {
        assert_eq!(find_token("...12:34:56:07..."), Some("12:34:56:07"));
        assert_eq!(
            find_token("00000000  2024-01-01 10:00:00:12 |    1234   5678R"),
            Some("10:00:00:12")
        );
    }

    #[test]
    fn test_takes_first_match() {
        assert_eq!(find_token("01:00:00:00 02:00:00:00"), Some("01:00:00:00"));
    }

    #[test]
    fn test_ignores_non_ascii_digits() {
        let line = "\u{661}\u{660}:\u{660}\u{660}:\u{660}\u{660}:\u{660}\u{660} 01:00:00:00";
        assert_eq!(find_token(line), Some("01:00:00:00"));
        assert_eq!(find_token("\u{ff11}\u{ff10}:00:00:00"), None);

        let rate = FrameRate::Fps25;
        let value = scan_line(line, rate).unwrap().unwrap();
        assert_eq!(value, TimeCode::new(1, 0, 0, 0, rate).unwrap());
    }

    #[test]
    fn test_no_token() {
        assert_eq!(find_token(""), None);
        assert_eq!(find_token("#User bits  Timecode   |  Pos. (samples)"), None);
        assert_eq!(find_token("1:00:00:00"), None);
        assert_eq!(find_token("10:00:00"), None);
    }

    #[test]
    fn test_scan_line() {
        let rate = FrameRate::Fps25;
        let value = scan_line("tc 12:34:56:07", rate).unwrap().unwrap();
        assert_eq!(value, TimeCode::new(12, 34, 56, 7, rate).unwrap());

        assert!(scan_line("no timecode here", rate).is_none());
        assert!(scan_line("99:99:99:99", rate).unwrap().is_err());
    }
}
