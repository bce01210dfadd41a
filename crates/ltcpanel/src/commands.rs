use anyhow::{anyhow, bail};
use ltcpanel_core::{FrameRate, TimeCode};

pub const HELP: &str = "\
Commands:
  now               generate from the current time of day
  zero              generate from 00:00:00:00
  start HH:MM:SS:FF generate from a custom timecode
  pause             pause generation
  resume            resume from the paused timecode
  stop              stop generation
  display           show or hide the timecode mirror
  status            print the engine state
  help              show this help
  quit              stop everything and exit";

/// A typed panel command. Each generator command maps onto one façade
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartNow,
    StartZero,
    /// Already validated against the panel frame rate.
    StartAt(TimeCode),
    Pause,
    Resume,
    Stop,
    ToggleDisplay,
    Status,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str, frame_rate: FrameRate) -> Result<Option<Command>, anyhow::Error> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let argument = words.next();
    if words.next().is_some() {
        bail!("Too many arguments for '{}'", verb);
    }

    let command = match (verb.to_ascii_lowercase().as_str(), argument) {
        ("now", None) => Command::StartNow,
        ("zero", None) => Command::StartZero,
        ("start", Some(text)) => {
            let at = TimeCode::parse(text, frame_rate)
                .map_err(|e| anyhow!("Invalid timecode: {}", e))?;
            Command::StartAt(at)
        }
        ("start", None) => bail!("Usage: start HH:MM:SS:FF"),
        ("pause", None) => Command::Pause,
        ("resume", None) => Command::Resume,
        ("stop", None) => Command::Stop,
        ("display", None) => Command::ToggleDisplay,
        ("status", None) => Command::Status,
        ("help" | "?", None) => Command::Help,
        ("quit" | "exit", None) => Command::Quit,
        (_, Some(_)) if is_known(verb) => bail!("'{}' takes no arguments", verb),
        _ => bail!("Unknown command '{}', type 'help'", verb),
    };

    Ok(Some(command))
}

fn is_known(verb: &str) -> bool {
    matches!(
        verb.to_ascii_lowercase().as_str(),
        "now" | "zero" | "pause" | "resume" | "stop" | "display" | "status" | "help" | "?"
            | "quit" | "exit"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: FrameRate = FrameRate::Fps25;

    #[test]
    fn test_generator_commands() {
        assert_eq!(parse_command("now", RATE).unwrap(), Some(Command::StartNow));
        assert_eq!(parse_command("  ZERO ", RATE).unwrap(), Some(Command::StartZero));
        assert_eq!(parse_command("pause", RATE).unwrap(), Some(Command::Pause));
        assert_eq!(parse_command("resume", RATE).unwrap(), Some(Command::Resume));
        assert_eq!(parse_command("stop", RATE).unwrap(), Some(Command::Stop));
    }

    #[test]
    fn test_start_validates_timecode() {
        let expected = TimeCode::new(1, 2, 3, 4, RATE).unwrap();
        assert_eq!(
            parse_command("start 01:02:03:04", RATE).unwrap(),
            Some(Command::StartAt(expected))
        );

        let err = parse_command("start 01:02:03:25", RATE).unwrap_err();
        assert!(err.to_string().starts_with("Invalid timecode"));
        assert!(parse_command("start 1:02:03:04", RATE).is_err());
        assert!(parse_command("start", RATE).is_err());
    }

    #[test]
    fn test_blank_and_unknown() {
        assert_eq!(parse_command("", RATE).unwrap(), None);
        assert_eq!(parse_command("   ", RATE).unwrap(), None);
        assert!(parse_command("rewind", RATE).is_err());
        assert!(parse_command("pause now", RATE).is_err());
        assert!(parse_command("start 00:00:00:00 extra", RATE).is_err());
    }
}
