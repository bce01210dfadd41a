//! Generator controller: owns the encoder process and the anchor from which
//! the in-flight timecode is derived.
//!
//! The encoder emits the real LTC signal. The value shown on the mirror is
//! recomputed from wall-clock time elapsed since the anchor, never by
//! counting ticks, so scheduling jitter cannot accumulate.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::LtcError;
use crate::process::{EncoderLauncher, ManagedProcess};
use crate::timecode::{FrameRate, TimeCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeneratorStatus {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl GeneratorStatus {
    pub fn can_pause(&self) -> bool {
        *self == Self::Running
    }

    pub fn can_resume(&self) -> bool {
        *self == Self::Paused
    }
}

impl fmt::Display for GeneratorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Start timecode paired with the instant generation began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub timecode: TimeCode,
    pub instant: Instant,
}

impl Anchor {
    pub fn timecode_at(&self, now: Instant) -> TimeCode {
        let elapsed = now.saturating_duration_since(self.instant);
        self.timecode.advance(self.timecode.frame_rate.frames_in(elapsed))
    }
}

/// State of the current generator session.
///
/// `id` changes on every start and stop, so work tagged with an older id
/// (a process exit observed late, for instance) can be recognised as stale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeneratorSession {
    pub id: u64,
    pub status: GeneratorStatus,
    pub anchor: Option<Anchor>,
    pub paused_timecode: Option<TimeCode>,
}

pub struct GeneratorController {
    launcher: Arc<dyn EncoderLauncher>,
    frame_rate: FrameRate,
    grace: Duration,
    session: GeneratorSession,
    process: Option<Box<dyn ManagedProcess>>,
    next_id: u64,
}

impl GeneratorController {
    pub fn new(launcher: Arc<dyn EncoderLauncher>, frame_rate: FrameRate, grace: Duration) -> Self {
        Self {
            launcher,
            frame_rate,
            grace,
            session: GeneratorSession::default(),
            process: None,
            next_id: 1,
        }
    }

    pub fn session(&self) -> &GeneratorSession {
        &self.session
    }

    pub fn status(&self) -> GeneratorStatus {
        self.session.status
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn has_process(&self) -> bool {
        self.process.is_some()
    }

    /// Simulated in-flight timecode while running, the frozen value while
    /// paused, nothing while stopped.
    pub fn current_timecode(&self) -> Option<TimeCode> {
        match self.session.status {
            GeneratorStatus::Running => self
                .session
                .anchor
                .map(|anchor| anchor.timecode_at(Instant::now())),
            GeneratorStatus::Paused => self.session.paused_timecode,
            GeneratorStatus::Stopped => None,
        }
    }

    /// Periodic tick: the recomputed timecode, only while running.
    pub fn tick(&self) -> Option<TimeCode> {
        if self.session.status == GeneratorStatus::Running {
            self.current_timecode()
        } else {
            None
        }
    }

    /// Start generating from `at`, replacing whatever was running.
    ///
    /// If the encoder fails to launch, a stopped or paused session is left as
    /// it was. A running session has already lost its encoder at that point
    /// and falls back to stopped.
    pub async fn start(&mut self, at: TimeCode) -> Result<TimeCode, LtcError> {
        let at = TimeCode::new(at.hours, at.minutes, at.seconds, at.frames, self.frame_rate)?;
        let prior = self.session.status;

        self.terminate_process().await;

        let process = match self.launcher.launch(self.frame_rate, at) {
            Ok(process) => process,
            Err(e) => {
                log::error!("Encoder launch failed: {}", e);
                if prior == GeneratorStatus::Running {
                    self.reset();
                }
                return Err(e);
            }
        };

        self.process = Some(process);
        self.session = GeneratorSession {
            id: self.take_id(),
            status: GeneratorStatus::Running,
            anchor: Some(Anchor {
                timecode: at,
                instant: Instant::now(),
            }),
            paused_timecode: None,
        };

        log::info!("Generating LTC from {} at {}", at, self.frame_rate);
        Ok(at)
    }

    pub async fn pause(&mut self) -> Result<TimeCode, LtcError> {
        if !self.session.status.can_pause() {
            return Err(self.precondition("pause"));
        }

        // Freeze before tearing the encoder down; termination may take a while.
        let paused = self
            .current_timecode()
            .unwrap_or_else(|| TimeCode::zero(self.frame_rate));

        self.terminate_process().await;
        self.session.status = GeneratorStatus::Paused;
        self.session.anchor = None;
        self.session.paused_timecode = Some(paused);

        log::info!("Generation paused at {}", paused);
        Ok(paused)
    }

    pub async fn resume(&mut self) -> Result<TimeCode, LtcError> {
        let paused = match (self.session.status, self.session.paused_timecode) {
            (GeneratorStatus::Paused, Some(paused)) => paused,
            _ => return Err(self.precondition("resume")),
        };

        let at = self.start(paused).await?;
        log::info!("Generation resumed from {}", at);
        Ok(at)
    }

    /// Stop generation. Always succeeds; returns whether anything was stopped.
    pub async fn stop(&mut self) -> bool {
        let was_stopped = self.session.status == GeneratorStatus::Stopped && self.process.is_none();

        self.terminate_process().await;
        if !was_stopped {
            self.reset();
            log::info!("Generation stopped");
        }

        !was_stopped
    }

    /// Resolves when the current encoder exits on its own, tagged with the
    /// session it belonged to. Pending forever when there is no encoder.
    pub async fn wait_for_exit(&mut self) -> (u64, Option<i32>) {
        let session_id = self.session.id;
        match self.process.as_mut() {
            Some(process) => (session_id, process.wait().await),
            None => std::future::pending().await,
        }
    }

    /// Handle an encoder exit observed by [`wait_for_exit`]. Stale exits are
    /// ignored; a live one forces the session to stopped.
    ///
    /// [`wait_for_exit`]: Self::wait_for_exit
    pub fn on_process_exit(&mut self, session_id: u64, code: Option<i32>) -> Option<LtcError> {
        if session_id != self.session.id || self.session.status != GeneratorStatus::Running {
            log::debug!("Ignoring encoder exit from stale session {}", session_id);
            return None;
        }

        let program = self.launcher.program().to_string();
        log::error!("Encoder {} died while generating (code {:?})", program, code);

        self.process = None;
        self.reset();
        Some(LtcError::ProcessExited { program, code })
    }

    async fn terminate_process(&mut self) {
        if let Some(mut process) = self.process.take() {
            log::debug!("Terminating encoder {:?}", process.id());
            process.terminate(self.grace).await;
        }
    }

    fn reset(&mut self) {
        self.session = GeneratorSession {
            id: self.take_id(),
            ..GeneratorSession::default()
        };
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn precondition(&self, operation: &'static str) -> LtcError {
        let err = LtcError::Precondition {
            operation,
            status: self.session.status,
        };
        log::debug!("Ignoring request: {}", err);
        err
    }
}
