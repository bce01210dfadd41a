use std::time::Duration;

use thiserror::Error;

use crate::generator::GeneratorStatus;

/// Rejected timecode text or value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimecodeError {
    #[error("invalid timecode {0:?}, expected HH:MM:SS:FF")]
    Malformed(String),

    #[error("{field} {value} out of range (max {max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("unsupported frame rate {0:?}")]
    UnsupportedFrameRate(String),
}

/// Errors surfaced by the timecode engine. None of them are fatal; every one
/// is recovered by retrying the request that produced it.
#[derive(Debug, Error)]
pub enum LtcError {
    #[error(transparent)]
    Format(#[from] TimecodeError),

    #[error("cannot {operation} while {status}")]
    Precondition {
        operation: &'static str,
        status: GeneratorStatus,
    },

    #[error("failed to launch {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited unexpectedly ({})", describe_exit(.code))]
    ProcessExited { program: String, code: Option<i32> },

    #[error("no decoder output for {after:?}")]
    StreamTimeout { after: Duration },

    #[error("timecode engine is not running")]
    EngineClosed,
}

impl LtcError {
    /// Precondition failures are expected from UI races and only worth a
    /// debug line.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("exit code {}", code),
        None => "killed by signal".to_string(),
    }
}
