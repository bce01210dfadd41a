//! In-process stand-ins for the LTC tools.
//!
//! Used by `ltcpanel --simulate` to run the panel without `ltc-tools`, and by
//! the tests to drive the engine deterministically. Clones share state, so a
//! test can keep one handle while the engine owns another.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};

use crate::error::LtcError;
use crate::process::{DecoderLauncher, DecoderStream, EncoderLauncher, ManagedProcess};
use crate::timecode::{FrameRate, TimeCode};

/// `None` while alive, `Some(code)` once exited.
type ExitSignal = Arc<watch::Sender<Option<Option<i32>>>>;

fn exit_signal() -> ExitSignal {
    Arc::new(watch::channel(None).0)
}

fn mark_exited(signal: &ExitSignal, code: Option<i32>) -> bool {
    signal.send_if_modified(|state| {
        if state.is_none() {
            *state = Some(code);
            true
        } else {
            false
        }
    })
}

fn is_alive(signal: &ExitSignal) -> bool {
    signal.borrow().is_none()
}

fn launch_refused(program: &str) -> LtcError {
    LtcError::ProcessLaunch {
        program: program.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "simulated launch failure"),
    }
}

/// A fake child process. Dropping it counts as killing it.
pub struct SimulatedProcess {
    id: u32,
    exit: ExitSignal,
    on_stop: Option<Box<dyn FnOnce() + Send>>,
}

impl SimulatedProcess {
    fn new(id: u32, exit: ExitSignal) -> Self {
        Self {
            id,
            exit,
            on_stop: None,
        }
    }
}

#[async_trait]
impl ManagedProcess for SimulatedProcess {
    fn id(&self) -> Option<u32> {
        is_alive(&self.exit).then_some(self.id)
    }

    async fn wait(&mut self) -> Option<i32> {
        let mut rx = self.exit.subscribe();
        let code = match rx.wait_for(Option::is_some).await {
            Ok(state) => (*state).flatten(),
            Err(_) => None,
        };
        code
    }

    async fn terminate(&mut self, _grace: Duration) {
        mark_exited(&self.exit, None);
        if let Some(on_stop) = self.on_stop.take() {
            on_stop();
        }
    }
}

impl Drop for SimulatedProcess {
    fn drop(&mut self) {
        mark_exited(&self.exit, None);
    }
}

#[derive(Default)]
struct EncoderState {
    launches: Vec<(FrameRate, TimeCode)>,
    processes: Vec<ExitSignal>,
    fail_next: bool,
}

/// Encoder that never produces audio but behaves like a process.
#[derive(Clone, Default)]
pub struct SimulatedEncoder {
    state: Arc<Mutex<EncoderState>>,
}

impl SimulatedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(frame_rate, start)` the encoder was launched with.
    pub fn launches(&self) -> Vec<(FrameRate, TimeCode)> {
        self.state.lock().launches.clone()
    }

    pub fn live_processes(&self) -> usize {
        self.state
            .lock()
            .processes
            .iter()
            .filter(|p| is_alive(p))
            .count()
    }

    pub fn fail_next_launch(&self) {
        self.state.lock().fail_next = true;
    }

    /// Make the most recent live encoder exit on its own.
    pub fn crash(&self, code: Option<i32>) {
        let state = self.state.lock();
        if let Some(process) = state.processes.iter().rev().find(|p| is_alive(p)) {
            mark_exited(process, code);
        }
    }
}

impl EncoderLauncher for SimulatedEncoder {
    fn program(&self) -> &str {
        "simulated-ltcgen"
    }

    fn launch(
        &self,
        frame_rate: FrameRate,
        start: TimeCode,
    ) -> Result<Box<dyn ManagedProcess>, LtcError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next) {
            return Err(launch_refused(self.program()));
        }

        state.launches.push((frame_rate, start));
        state.processes.retain(is_alive);
        let exit = exit_signal();
        state.processes.push(Arc::clone(&exit));

        Ok(Box::new(SimulatedProcess::new(
            state.launches.len() as u32,
            exit,
        )))
    }
}

#[derive(Default)]
struct DecoderState {
    launches: usize,
    fail_next: bool,
    lines: Option<mpsc::UnboundedSender<String>>,
    exit: Option<ExitSignal>,
}

/// Decoder whose output lines are fed by the caller.
#[derive(Clone, Default)]
pub struct SimulatedDecoder {
    state: Arc<Mutex<DecoderState>>,
}

impl SimulatedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> usize {
        self.state.lock().launches
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().exit.as_ref().is_some_and(is_alive)
    }

    pub fn fail_next_launch(&self) {
        self.state.lock().fail_next = true;
    }

    /// Emit one line on the current decoder's stdout. Returns false when no
    /// decoder is running.
    pub fn send_line(&self, line: &str) -> bool {
        self.state
            .lock()
            .lines
            .as_ref()
            .is_some_and(|tx| tx.send(line.to_string()).is_ok())
    }

    /// Close stdout and exit the current decoder with `code`.
    pub fn exit(&self, code: Option<i32>) {
        let mut state = self.state.lock();
        state.lines = None;
        if let Some(exit) = &state.exit {
            mark_exited(exit, code);
        }
    }
}

impl DecoderLauncher for SimulatedDecoder {
    fn program(&self) -> &str {
        "simulated-ltcdump"
    }

    fn launch(&self) -> Result<DecoderStream, LtcError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next) {
            return Err(launch_refused(self.program()));
        }

        let (reader, mut writer) = tokio::io::duplex(4096);
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err()
                    || writer.write_all(b"\n").await.is_err()
                {
                    break;
                }
            }
        });

        state.launches += 1;
        state.lines = Some(tx);
        let exit = exit_signal();
        state.exit = Some(Arc::clone(&exit));

        let launch = state.launches;
        let mut process = SimulatedProcess::new(launch as u32, exit);
        let shared = Arc::clone(&self.state);
        process.on_stop = Some(Box::new(move || {
            let mut state = shared.lock();
            if state.launches == launch {
                state.lines = None;
            }
        }));

        Ok(DecoderStream {
            process: Box::new(process),
            output: Box::new(reader),
        })
    }
}
