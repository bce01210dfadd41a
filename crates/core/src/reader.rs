//! Reader monitor: turns decoder output into incoming-timecode state.
//!
//! The decoder is read on its own task ([`spawn_read_loop`]), which only
//! forwards raw [`DecoderMessage`]s. All [`ReaderState`] mutation happens in
//! [`ReaderMonitor`], which lives on the control loop.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::process::DecoderStream;
use crate::timecode::{scan_line, FrameRate, TimeCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReaderState {
    pub signal_present: bool,
    pub last_timecode: Option<TimeCode>,
}

/// Something the control loop should publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderEvent {
    TimecodeObserved(TimeCode),
    SignalLost,
}

pub struct ReaderMonitor {
    frame_rate: FrameRate,
    state: ReaderState,
}

impl ReaderMonitor {
    pub fn new(frame_rate: FrameRate) -> Self {
        Self {
            frame_rate,
            state: ReaderState::default(),
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Lines without a timecode token are ignored, as are lines whose first
    /// token is out of range for the frame rate.
    pub fn on_line(&mut self, line: &str) -> Option<ReaderEvent> {
        match scan_line(line, self.frame_rate)? {
            Ok(timecode) => {
                self.state.last_timecode = Some(timecode);
                self.state.signal_present = true;
                Some(ReaderEvent::TimecodeObserved(timecode))
            }
            Err(e) => {
                log::debug!("Ignoring decoder line {:?}: {}", line, e);
                None
            }
        }
    }

    /// No line within the signal timeout. Repeats are fine and keep
    /// reporting the loss.
    pub fn on_read_timeout(&mut self) -> ReaderEvent {
        self.state.signal_present = false;
        ReaderEvent::SignalLost
    }

    pub fn on_process_exit(&mut self, code: Option<i32>) -> ReaderEvent {
        log::error!("LTC decoder exited (code {:?}), incoming timecode unavailable", code);
        self.on_read_timeout()
    }
}

/// Raw activity observed on a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderMessage {
    Line(String),
    Timeout,
    Exited(Option<i32>),
}

/// A decoder message tagged with the decoder instance that produced it.
pub type TaggedDecoderMessage = (u64, DecoderMessage);

/// Handle to a running read loop.
pub struct DecoderTask {
    generation: u64,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl DecoderTask {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Terminate the decoder and wait for the read loop to finish, at most
    /// `bound`. The loop itself spends at most the termination grace period.
    pub async fn stop(mut self, bound: Duration) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        match tokio::time::timeout(bound, &mut self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Decoder read loop failed: {}", e),
            Err(_) => {
                log::warn!("Decoder read loop did not stop in {:?}, aborting", bound);
                self.handle.abort();
            }
        }
    }
}

/// Read `stream` line by line on a separate task, forwarding everything to
/// `tx` tagged with `generation`.
///
/// A [`DecoderMessage::Timeout`] is sent each time `signal_timeout` passes
/// without a complete line. On end of output the loop waits for the process
/// and reports [`DecoderMessage::Exited`].
pub fn spawn_read_loop(
    stream: DecoderStream,
    generation: u64,
    signal_timeout: Duration,
    grace: Duration,
    tx: mpsc::Sender<TaggedDecoderMessage>,
) -> DecoderTask {
    let (stop_tx, stop_rx) = oneshot::channel();
    let handle = tokio::spawn(read_loop(
        stream,
        generation,
        signal_timeout,
        grace,
        tx,
        stop_rx,
    ));

    DecoderTask {
        generation,
        stop: Some(stop_tx),
        handle,
    }
}

async fn read_loop(
    stream: DecoderStream,
    generation: u64,
    signal_timeout: Duration,
    grace: Duration,
    tx: mpsc::Sender<TaggedDecoderMessage>,
    mut stop: oneshot::Receiver<()>,
) {
    let DecoderStream {
        mut process,
        output,
    } = stream;
    let mut output = BufReader::new(output);
    // Partial lines survive a timeout: read_until appends to `buf`.
    let mut buf = Vec::new();

    loop {
        let message = tokio::select! {
            _ = &mut stop => {
                process.terminate(grace).await;
                return;
            }
            read = tokio::time::timeout(signal_timeout, output.read_until(b'\n', &mut buf)) => {
                match read {
                    Ok(Ok(0)) => break,
                    Ok(Ok(_)) => {
                        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                        buf.clear();
                        DecoderMessage::Line(line)
                    }
                    Ok(Err(e)) => {
                        log::warn!("Decoder output read failed: {}", e);
                        break;
                    }
                    Err(_) => DecoderMessage::Timeout,
                }
            }
        };

        if tx.send((generation, message)).await.is_err() {
            process.terminate(grace).await;
            return;
        }
    }

    let code = tokio::select! {
        _ = &mut stop => {
            process.terminate(grace).await;
            return;
        }
        code = process.wait() => code,
    };

    let _ = tx.send((generation, DecoderMessage::Exited(code))).await;
}
