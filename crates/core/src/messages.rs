use std::fmt;

use tokio::sync::oneshot;

use crate::display::{DisplayId, DisplaySink};
use crate::error::LtcError;
use crate::generator::GeneratorStatus;
use crate::reader::ReaderState;
use crate::timecode::TimeCode;

pub type Reply<T> = oneshot::Sender<Result<T, LtcError>>;

/// Requests sent from a front end to the control loop.
pub enum ControlCommand {
    // Generator
    StartCurrentClock {
        reply: Reply<TimeCode>,
    },
    StartFromZero {
        reply: Reply<TimeCode>,
    },
    StartCustom {
        text: String,
        reply: Reply<TimeCode>,
    },
    Pause {
        reply: Reply<TimeCode>,
    },
    Resume {
        reply: Reply<TimeCode>,
    },
    Stop {
        reply: Reply<()>,
    },

    // Mirror displays
    AttachDisplay {
        sink: Box<dyn DisplaySink>,
        reply: oneshot::Sender<DisplayId>,
    },
    DetachDisplay {
        id: DisplayId,
        reply: oneshot::Sender<bool>,
    },

    // System
    Snapshot {
        reply: oneshot::Sender<EngineSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl fmt::Debug for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartCurrentClock { .. } => write!(f, "StartCurrentClock"),
            Self::StartFromZero { .. } => write!(f, "StartFromZero"),
            Self::StartCustom { text, .. } => write!(f, "StartCustom({:?})", text),
            Self::Pause { .. } => write!(f, "Pause"),
            Self::Resume { .. } => write!(f, "Resume"),
            Self::Stop { .. } => write!(f, "Stop"),
            Self::AttachDisplay { .. } => write!(f, "AttachDisplay"),
            Self::DetachDisplay { id, .. } => write!(f, "DetachDisplay({:?})", id),
            Self::Snapshot { .. } => write!(f, "Snapshot"),
            Self::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}

/// Decoder lifecycle as seen by the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderStatus {
    /// Decoder launched, waiting for a signal.
    Reading,
    /// First timecode after launch or after a signal loss.
    SignalDetected,
    DecoderStopped { code: Option<i32> },
    LaunchFailed(String),
    Restarting,
}

impl fmt::Display for ReaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reading => write!(f, "Reading..."),
            Self::SignalDetected => write!(f, "LTC signal detected"),
            Self::DecoderStopped { .. } => write!(f, "Decoder stopped"),
            Self::LaunchFailed(reason) => write!(f, "Cannot start LTC reading: {}", reason),
            Self::Restarting => write!(f, "Restarting decoder..."),
        }
    }
}

/// Generator state changes, carrying the timecode they happened at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorTransition {
    Started(TimeCode),
    Paused(TimeCode),
    Resumed(TimeCode),
    Stopped,
    Died { code: Option<i32> },
}

impl GeneratorTransition {
    pub fn status(&self) -> GeneratorStatus {
        match self {
            Self::Started(_) | Self::Resumed(_) => GeneratorStatus::Running,
            Self::Paused(_) => GeneratorStatus::Paused,
            Self::Stopped | Self::Died { .. } => GeneratorStatus::Stopped,
        }
    }

    /// Short upper-case status for the mirror display.
    pub fn mirror_status(&self) -> String {
        match self {
            Self::Started(tc) => format!("GENERATING: {}", tc),
            Self::Paused(tc) => format!("PAUSE: {}", tc),
            Self::Resumed(tc) => format!("RESUME: {}", tc),
            Self::Stopped => "GENERATION STOPPED".to_string(),
            Self::Died { .. } => "GENERATOR DIED".to_string(),
        }
    }
}

impl fmt::Display for GeneratorTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started(tc) => write!(f, "Generating from {}", tc),
            Self::Paused(tc) => write!(f, "Paused at {}", tc),
            Self::Resumed(tc) => write!(f, "Resumed from {}", tc),
            Self::Stopped => write!(f, "Stopped"),
            Self::Died { .. } => write!(f, "Generator process died"),
        }
    }
}

/// Events published by the control loop to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    IncomingTimecode(TimeCode),
    /// Re-sent on every timeout while the signal stays absent.
    IncomingSignalLost,
    ReaderStatusChanged(ReaderStatus),
    /// Simulated in-flight value of the generated signal.
    GeneratedTimecode(TimeCode),
    GeneratorStatusChanged(GeneratorTransition),
    ValidationFailed(String),
    Error(String),
}

impl ControlEvent {
    /// Status line for the control panel, if this event changes it.
    pub fn status_text(&self) -> Option<String> {
        match self {
            Self::IncomingTimecode(_) | Self::GeneratedTimecode(_) => None,
            Self::IncomingSignalLost => Some("No LTC signal".to_string()),
            Self::ReaderStatusChanged(status) => Some(status.to_string()),
            Self::GeneratorStatusChanged(transition) => Some(transition.to_string()),
            Self::ValidationFailed(reason) => Some(format!("Invalid timecode: {}", reason)),
            Self::Error(message) => Some(format!("Error: {}", message)),
        }
    }
}

/// Point-in-time view of the engine, for front ends that poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub reader: ReaderState,
    pub decoder_running: bool,
    pub generator: GeneratorStatus,
    pub generated_timecode: Option<TimeCode>,
    pub paused_timecode: Option<TimeCode>,
    pub displays: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timecode::FrameRate;

    #[test]
    fn test_transition_texts() {
        let tc = TimeCode::parse("01:00:02:00", FrameRate::Fps25).unwrap();

        let paused = GeneratorTransition::Paused(tc);
        assert_eq!(paused.to_string(), "Paused at 01:00:02:00");
        assert_eq!(paused.mirror_status(), "PAUSE: 01:00:02:00");
        assert_eq!(paused.status(), GeneratorStatus::Paused);

        let died = GeneratorTransition::Died { code: Some(1) };
        assert_eq!(died.status(), GeneratorStatus::Stopped);
        assert_eq!(died.mirror_status(), "GENERATOR DIED");
    }

    #[test]
    fn test_status_text() {
        let tc = TimeCode::zero(FrameRate::Fps25);
        assert_eq!(ControlEvent::IncomingTimecode(tc).status_text(), None);
        assert_eq!(
            ControlEvent::IncomingSignalLost.status_text().as_deref(),
            Some("No LTC signal")
        );
        assert_eq!(
            ControlEvent::ReaderStatusChanged(ReaderStatus::SignalDetected)
                .status_text()
                .as_deref(),
            Some("LTC signal detected")
        );
    }
}
