//! External LTC encoder/decoder processes.
//!
//! The engine never decodes or encodes audio itself. It launches a decoder
//! once and reads its stdout, and launches an encoder per generator session.
//! Both sit behind launcher traits so the engine can be driven by fakes.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use crate::error::LtcError;
use crate::timecode::{FrameRate, TimeCode};

/// Placeholder in encoder arguments replaced by the frame rate.
pub const FPS_PLACEHOLDER: &str = "{fps}";
/// Placeholder in encoder arguments replaced by the start timecode.
pub const START_PLACEHOLDER: &str = "{start}";

/// A running child process owned by the engine.
#[async_trait]
pub trait ManagedProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Resolves once the process has exited, with its exit code (`None` when
    /// killed by a signal). Must be cancel safe: the control loop drops and
    /// re-creates this future on every iteration.
    async fn wait(&mut self) -> Option<i32>;

    /// Ask the process to stop, then force-kill it if it is still alive after
    /// `grace`. Returns once the process is gone.
    async fn terminate(&mut self, grace: Duration);
}

/// Starts an encoder seeded with a frame rate and start timecode.
pub trait EncoderLauncher: Send + Sync {
    fn program(&self) -> &str;

    fn launch(
        &self,
        frame_rate: FrameRate,
        start: TimeCode,
    ) -> Result<Box<dyn ManagedProcess>, LtcError>;
}

/// A launched decoder: the process plus its line-oriented output stream.
pub struct DecoderStream {
    pub process: Box<dyn ManagedProcess>,
    pub output: Box<dyn AsyncRead + Send + Unpin>,
}

/// Starts the decoder whose output the reader monitor consumes.
pub trait DecoderLauncher: Send + Sync {
    fn program(&self) -> &str;

    fn launch(&self) -> Result<DecoderStream, LtcError>;
}

/// [`ManagedProcess`] backed by a tokio child.
pub struct ChildProcess {
    program: String,
    child: Child,
}

impl ChildProcess {
    pub fn new(program: impl Into<String>, child: Child) -> Self {
        Self {
            program: program.into(),
            child,
        }
    }

    #[cfg(unix)]
    fn request_stop(&mut self) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match self.child.id() {
            Some(pid) => match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Failed to send SIGTERM to {} ({}): {}", self.program, pid, e);
                    false
                }
            },
            None => false,
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) -> bool {
        false
    }
}

#[async_trait]
impl ManagedProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Option<i32> {
        match self.child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                log::warn!("Failed to wait on {}: {}", self.program, e);
                None
            }
        }
    }

    async fn terminate(&mut self, grace: Duration) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }

        if self.request_stop() {
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(_) => {
                    log::debug!("{} stopped gracefully", self.program);
                    return;
                }
                Err(_) => {
                    log::warn!(
                        "{} still running after {:?}, killing it",
                        self.program,
                        grace
                    );
                }
            }
        }

        if let Err(e) = self.child.kill().await {
            log::error!("Failed to kill {}: {}", self.program, e);
        }
    }
}

/// Launches the encoder as an external program (`ltcgen` by default).
///
/// `{fps}` and `{start}` in the argument template are substituted per launch.
pub struct SystemEncoder {
    program: String,
    args: Vec<String>,
}

impl SystemEncoder {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn command_args(&self, frame_rate: FrameRate, start: TimeCode) -> Vec<String> {
        let start = start.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(FPS_PLACEHOLDER, frame_rate.as_arg())
                    .replace(START_PLACEHOLDER, &start)
            })
            .collect()
    }
}

impl EncoderLauncher for SystemEncoder {
    fn program(&self) -> &str {
        &self.program
    }

    fn launch(
        &self,
        frame_rate: FrameRate,
        start: TimeCode,
    ) -> Result<Box<dyn ManagedProcess>, LtcError> {
        let args = self.command_args(frame_rate, start);
        log::info!("Launching encoder: {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LtcError::ProcessLaunch {
                program: self.program.clone(),
                source,
            })?;

        Ok(Box::new(ChildProcess::new(&self.program, child)))
    }
}

/// Launches the decoder as an external program (`ltcdump` by default).
pub struct SystemDecoder {
    program: String,
    args: Vec<String>,
}

impl SystemDecoder {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl DecoderLauncher for SystemDecoder {
    fn program(&self) -> &str {
        &self.program
    }

    fn launch(&self) -> Result<DecoderStream, LtcError> {
        log::info!("Launching decoder: {} {}", self.program, self.args.join(" "));

        let launch_error = |source: io::Error| LtcError::ProcessLaunch {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(launch_error)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error(io::Error::other("stdout was not captured")))?;

        Ok(DecoderStream {
            process: Box::new(ChildProcess::new(&self.program, child)),
            output: Box::new(stdout),
        })
    }
}

/// Check that `program` can be executed, by running `program --help`.
///
/// A program that hangs past `timeout` still counts as present.
pub async fn probe_program(program: &str, timeout: Duration) -> bool {
    let status = Command::new(program)
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(timeout, status).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => false,
        Ok(Err(e)) => {
            log::warn!("Could not probe {}: {}", program, e);
            false
        }
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_args_substitution() {
        let encoder = SystemEncoder::new(
            "ltcgen",
            ["-f", "{fps}", "-s", "{start}", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let start = TimeCode::new(1, 0, 0, 0, FrameRate::Fps2997).unwrap();
        assert_eq!(
            encoder.command_args(FrameRate::Fps2997, start),
            vec!["-f", "29.97", "-s", "01:00:00:00", "-"]
        );
    }

    #[tokio::test]
    async fn test_missing_encoder_fails_to_launch() {
        let encoder = SystemEncoder::new("ltcpanel-test-no-such-program", Vec::new());
        let result = encoder.launch(FrameRate::Fps25, TimeCode::zero(FrameRate::Fps25));
        assert!(matches!(result, Err(LtcError::ProcessLaunch { .. })));
    }

    #[tokio::test]
    async fn test_missing_decoder_fails_to_launch() {
        let decoder = SystemDecoder::new("ltcpanel-test-no-such-program", Vec::new());
        assert!(matches!(
            decoder.launch(),
            Err(LtcError::ProcessLaunch { .. })
        ));
    }

    #[tokio::test]
    async fn test_probe_missing_program() {
        assert!(!probe_program("ltcpanel-test-no-such-program", Duration::from_secs(1)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_stops_child() {
        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut process = ChildProcess::new("sleep", child);
        assert!(process.id().is_some());

        tokio::time::timeout(
            Duration::from_secs(5),
            process.terminate(Duration::from_millis(500)),
        )
        .await
        .unwrap();
        assert!(process.id().is_none());
    }
}
