//! Mirror display sinks.
//!
//! A sink receives timecode and status strings pushed from the control loop,
//! up to once per frame. Implementations must not block: hand the strings to
//! a render thread or store them for polling.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::messages::{ControlEvent, ReaderStatus};

/// Shown before any timecode is known.
pub const PLACEHOLDER_TIMECODE: &str = "--:--:--:--";

pub const STATUS_WAITING: &str = "WAITING";
pub const STATUS_READING: &str = "READING LTC";
pub const STATUS_NO_SIGNAL: &str = "NO SIGNAL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayId(pub u64);

pub trait DisplaySink: Send {
    fn set_timecode(&mut self, text: &str);
    fn set_status(&mut self, text: &str);
}

/// Forward the parts of `event` the mirror shows to `sink`.
pub fn mirror_event(sink: &mut dyn DisplaySink, event: &ControlEvent) {
    match event {
        ControlEvent::IncomingTimecode(tc) | ControlEvent::GeneratedTimecode(tc) => {
            sink.set_timecode(&tc.to_string());
        }
        ControlEvent::IncomingSignalLost => sink.set_status(STATUS_NO_SIGNAL),
        ControlEvent::ReaderStatusChanged(ReaderStatus::SignalDetected) => {
            sink.set_status(STATUS_READING);
        }
        ControlEvent::GeneratorStatusChanged(transition) => {
            sink.set_status(&transition.mirror_status());
        }
        ControlEvent::ReaderStatusChanged(_)
        | ControlEvent::ValidationFailed(_)
        | ControlEvent::Error(_) => {}
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub timecode: String,
    pub status: String,
    /// Number of updates received, of either kind.
    pub updates: u64,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            timecode: PLACEHOLDER_TIMECODE.to_string(),
            status: STATUS_WAITING.to_string(),
            updates: 0,
        }
    }
}

/// Sink that keeps the latest values for another thread to read.
#[derive(Debug, Clone, Default)]
pub struct SharedDisplay {
    state: Arc<Mutex<DisplayState>>,
}

impl SharedDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DisplayState {
        self.state.lock().clone()
    }
}

impl DisplaySink for SharedDisplay {
    fn set_timecode(&mut self, text: &str) {
        let mut state = self.state.lock();
        state.timecode = text.to_string();
        state.updates += 1;
    }

    fn set_status(&mut self, text: &str) {
        let mut state = self.state.lock();
        state.status = text.to_string();
        state.updates += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::GeneratorTransition;
    use crate::timecode::{FrameRate, TimeCode};

    #[test]
    fn test_mirror_event() {
        let display = SharedDisplay::new();
        let mut sink = display.clone();
        let tc = TimeCode::parse("01:02:03:04", FrameRate::Fps25).unwrap();

        mirror_event(&mut sink, &ControlEvent::IncomingTimecode(tc));
        mirror_event(
            &mut sink,
            &ControlEvent::ReaderStatusChanged(ReaderStatus::SignalDetected),
        );
        assert_eq!(display.state().timecode, "01:02:03:04");
        assert_eq!(display.state().status, STATUS_READING);

        mirror_event(&mut sink, &ControlEvent::IncomingSignalLost);
        assert_eq!(display.state().status, STATUS_NO_SIGNAL);
        assert_eq!(display.state().timecode, "01:02:03:04");

        mirror_event(
            &mut sink,
            &ControlEvent::GeneratorStatusChanged(GeneratorTransition::Stopped),
        );
        assert_eq!(display.state().status, "GENERATION STOPPED");
    }

    #[test]
    fn test_errors_do_not_touch_display() {
        let display = SharedDisplay::new();
        let mut sink = display.clone();

        mirror_event(&mut sink, &ControlEvent::ValidationFailed("bad".to_string()));
        mirror_event(&mut sink, &ControlEvent::Error("boom".to_string()));
        assert_eq!(display.state(), DisplayState::default());
    }
}
