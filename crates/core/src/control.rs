//! Control façade and the control loop behind it.
//!
//! [`ControlFacade`] is a cheap handle: every request becomes a
//! [`ControlCommand`] on a channel and is answered over a oneshot. A single
//! task ([`ControlLoop`]) owns the reader state, the generator session and
//! the attached displays, so none of them is ever touched concurrently.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};

use crate::config::Settings;
use crate::display::{
    mirror_event, DisplayId, DisplaySink, PLACEHOLDER_TIMECODE, STATUS_READING, STATUS_WAITING,
};
use crate::error::LtcError;
use crate::generator::{GeneratorController, GeneratorStatus};
use crate::messages::{
    ControlCommand, ControlEvent, EngineSnapshot, GeneratorTransition, ReaderStatus, Reply,
};
use crate::process::{DecoderLauncher, EncoderLauncher, SystemDecoder, SystemEncoder};
use crate::reader::{
    spawn_read_loop, DecoderMessage, DecoderTask, ReaderEvent, ReaderMonitor,
    TaggedDecoderMessage,
};
use crate::timecode::{FrameRate, TimeCode};

const COMMAND_CAPACITY: usize = 64;
const DECODER_CAPACITY: usize = 256;
const EVENT_CAPACITY: usize = 1024;

/// Extra time the read loop gets on top of the termination grace period.
const DECODER_STOP_MARGIN: Duration = Duration::from_secs(1);

/// Front-end handle to a running timecode engine.
///
/// Dropping the façade without calling [`shutdown`](Self::shutdown) still
/// stops the engine, but nothing waits for it.
pub struct ControlFacade {
    commands: mpsc::Sender<ControlCommand>,
    events: broadcast::Sender<ControlEvent>,
    handle: Option<JoinHandle<()>>,
    frame_rate: FrameRate,
}

impl ControlFacade {
    /// Spawn the control loop and launch the decoder.
    ///
    /// Must be called from within a tokio runtime. The decoder is launched
    /// when the loop first runs, so a subscription taken right after `init`
    /// sees its launch status.
    pub fn init(
        settings: &Settings,
        encoder: Arc<dyn EncoderLauncher>,
        decoder: Arc<dyn DecoderLauncher>,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let control_loop =
            ControlLoop::new(settings, encoder, decoder, command_rx, events.clone());
        let handle = tokio::spawn(control_loop.run());

        log::info!(
            "Timecode engine started at {} (encoder {}, decoder {})",
            settings.frame_rate,
            settings.encoder_program,
            settings.decoder_program
        );

        Self {
            commands,
            events,
            handle: Some(handle),
            frame_rate: settings.frame_rate,
        }
    }

    /// [`init`](Self::init) with the external programs named in `settings`.
    pub fn with_system_tools(settings: &Settings) -> Self {
        let encoder = SystemEncoder::new(&settings.encoder_program, settings.encoder_args.clone());
        let decoder = SystemDecoder::new(&settings.decoder_program, settings.decoder_args.clone());
        Self::init(settings, Arc::new(encoder), Arc::new(decoder))
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.events.subscribe()
    }

    /// Start generating from the local time of day, frames zero.
    pub async fn request_start_current_clock(&self) -> Result<TimeCode, LtcError> {
        self.request(|reply| ControlCommand::StartCurrentClock { reply })
            .await
    }

    pub async fn request_start_from_zero(&self) -> Result<TimeCode, LtcError> {
        self.request(|reply| ControlCommand::StartFromZero { reply })
            .await
    }

    /// Start generating from `text` (`HH:MM:SS:FF`). Malformed text is
    /// reported as [`ControlEvent::ValidationFailed`] and changes nothing.
    pub async fn request_start_custom(&self, text: &str) -> Result<TimeCode, LtcError> {
        let text = text.to_string();
        self.request(|reply| ControlCommand::StartCustom { text, reply })
            .await
    }

    pub async fn request_pause(&self) -> Result<TimeCode, LtcError> {
        self.request(|reply| ControlCommand::Pause { reply }).await
    }

    pub async fn request_resume(&self) -> Result<TimeCode, LtcError> {
        self.request(|reply| ControlCommand::Resume { reply }).await
    }

    pub async fn request_stop(&self) -> Result<(), LtcError> {
        self.request(|reply| ControlCommand::Stop { reply }).await
    }

    pub async fn attach_display(
        &self,
        sink: impl DisplaySink + 'static,
    ) -> Result<DisplayId, LtcError> {
        let sink: Box<dyn DisplaySink> = Box::new(sink);
        self.query(|reply| ControlCommand::AttachDisplay { sink, reply })
            .await
    }

    /// Returns false when no display with `id` was attached.
    pub async fn detach_display(&self, id: DisplayId) -> Result<bool, LtcError> {
        self.query(|reply| ControlCommand::DetachDisplay { id, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot, LtcError> {
        self.query(|reply| ControlCommand::Snapshot { reply }).await
    }

    /// Stop generation and the decoder, detach displays and wait for the
    /// control loop to exit.
    pub async fn shutdown(mut self) -> Result<(), LtcError> {
        let result = self.query(|reply| ControlCommand::Shutdown { reply }).await;

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::error!("Control loop failed: {}", e);
            }
        }

        log::info!("Timecode engine shut down");
        result
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ControlCommand,
    ) -> Result<T, LtcError> {
        self.query(build).await?
    }

    async fn query<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControlCommand,
    ) -> Result<T, LtcError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| LtcError::EngineClosed)?;
        response.await.map_err(|_| LtcError::EngineClosed)
    }
}

/// Single owner of all mutable engine state.
struct ControlLoop {
    frame_rate: FrameRate,
    signal_timeout: Duration,
    grace: Duration,
    auto_restart: bool,
    restart_delay: Duration,

    commands: mpsc::Receiver<ControlCommand>,
    events: broadcast::Sender<ControlEvent>,

    reader: ReaderMonitor,
    decoder_launcher: Arc<dyn DecoderLauncher>,
    decoder: Option<DecoderTask>,
    generation: u64,
    decoder_tx: mpsc::Sender<TaggedDecoderMessage>,
    decoder_rx: mpsc::Receiver<TaggedDecoderMessage>,
    restart_at: Option<Instant>,

    generator: GeneratorController,
    ticker: Interval,

    displays: Vec<(DisplayId, Box<dyn DisplaySink>)>,
    next_display: u64,
    last_timecode: Option<TimeCode>,
}

impl ControlLoop {
    fn new(
        settings: &Settings,
        encoder: Arc<dyn EncoderLauncher>,
        decoder: Arc<dyn DecoderLauncher>,
        commands: mpsc::Receiver<ControlCommand>,
        events: broadcast::Sender<ControlEvent>,
    ) -> Self {
        let frame_rate = settings.frame_rate;
        let (decoder_tx, decoder_rx) = mpsc::channel(DECODER_CAPACITY);

        let mut ticker = interval(frame_rate.frame_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            frame_rate,
            signal_timeout: settings.signal_timeout(),
            grace: settings.terminate_grace(),
            auto_restart: settings.auto_restart_decoder,
            restart_delay: settings.decoder_restart_delay(),

            commands,
            events,

            reader: ReaderMonitor::new(frame_rate),
            decoder_launcher: decoder,
            decoder: None,
            generation: 0,
            decoder_tx,
            decoder_rx,
            restart_at: None,

            generator: GeneratorController::new(encoder, frame_rate, settings.terminate_grace()),
            ticker,

            displays: Vec::new(),
            next_display: 1,
            last_timecode: None,
        }
    }

    async fn run(mut self) {
        self.launch_decoder();

        loop {
            let running = self.generator.status() == GeneratorStatus::Running;
            let restart_at = self.restart_at;

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await.is_break() {
                            return;
                        }
                    }
                    None => {
                        log::info!("All control handles dropped, shutting down");
                        self.shutdown().await;
                        return;
                    }
                },
                Some((generation, message)) = self.decoder_rx.recv() => {
                    self.handle_decoder_message(generation, message);
                }
                _ = self.ticker.tick(), if running => self.on_tick(),
                (session_id, code) = self.generator.wait_for_exit() => {
                    self.on_encoder_exit(session_id, code);
                }
                _ = sleep_until(restart_at.unwrap_or_else(Instant::now)), if restart_at.is_some() => {
                    self.restart_at = None;
                    self.launch_decoder();
                }
            }
        }
    }

    /// Breaks once the engine has shut down.
    async fn handle_command(&mut self, command: ControlCommand) -> ControlFlow<()> {
        log::debug!("Control command: {:?}", command);

        match command {
            ControlCommand::StartCurrentClock { reply } => {
                let at = TimeCode::from_time_of_day(&chrono::Local::now(), self.frame_rate);
                let _ = reply.send(self.start(at).await);
            }
            ControlCommand::StartFromZero { reply } => {
                let at = TimeCode::zero(self.frame_rate);
                let _ = reply.send(self.start(at).await);
            }
            ControlCommand::StartCustom { text, reply } => {
                let result = match TimeCode::parse(&text, self.frame_rate) {
                    Ok(at) => self.start(at).await,
                    Err(e) => {
                        log::warn!("Rejected start timecode: {}", e);
                        self.publish(ControlEvent::ValidationFailed(e.to_string()));
                        Err(e.into())
                    }
                };
                let _ = reply.send(result);
            }
            ControlCommand::Pause { reply } => {
                let result = self.generator.pause().await;
                if let Ok(paused) = &result {
                    self.publish(ControlEvent::GeneratorStatusChanged(
                        GeneratorTransition::Paused(*paused),
                    ));
                    self.publish(ControlEvent::GeneratedTimecode(*paused));
                }
                let _ = reply.send(result);
            }
            ControlCommand::Resume { reply } => {
                let result = self.generator.resume().await;
                match &result {
                    Ok(at) => self.on_started(GeneratorTransition::Resumed(*at), *at),
                    Err(e) => self.report_start_failure(e, GeneratorStatus::Paused),
                }
                let _ = reply.send(result);
            }
            ControlCommand::Stop { reply } => {
                if self.generator.stop().await {
                    self.publish(ControlEvent::GeneratorStatusChanged(
                        GeneratorTransition::Stopped,
                    ));
                }
                let _ = reply.send(Ok(()));
            }
            ControlCommand::AttachDisplay { sink, reply } => {
                let _ = reply.send(self.attach_display(sink));
            }
            ControlCommand::DetachDisplay { id, reply } => {
                let before = self.displays.len();
                self.displays.retain(|(display, _)| *display != id);
                let detached = self.displays.len() != before;
                if detached {
                    log::info!("Display {:?} detached", id);
                }
                let _ = reply.send(detached);
            }
            ControlCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            ControlCommand::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    async fn start(&mut self, at: TimeCode) -> Result<TimeCode, LtcError> {
        let prior = self.generator.status();
        let result = self.generator.start(at).await;
        match &result {
            Ok(at) => self.on_started(GeneratorTransition::Started(*at), *at),
            Err(e) => self.report_start_failure(e, prior),
        }
        result
    }

    fn on_started(&mut self, transition: GeneratorTransition, at: TimeCode) {
        self.ticker.reset();
        self.publish(ControlEvent::GeneratorStatusChanged(transition));
        self.publish(ControlEvent::GeneratedTimecode(at));
    }

    fn report_start_failure(&mut self, error: &LtcError, prior: GeneratorStatus) {
        match error {
            LtcError::Precondition { .. } => return,
            LtcError::Format(e) => self.publish(ControlEvent::ValidationFailed(e.to_string())),
            other => self.publish(ControlEvent::Error(other.to_string())),
        }

        if prior != GeneratorStatus::Stopped && self.generator.status() == GeneratorStatus::Stopped
        {
            self.publish(ControlEvent::GeneratorStatusChanged(
                GeneratorTransition::Stopped,
            ));
        }
    }

    fn on_tick(&mut self) {
        if let Some(timecode) = self.generator.tick() {
            self.publish(ControlEvent::GeneratedTimecode(timecode));
        }
    }

    fn on_encoder_exit(&mut self, session_id: u64, code: Option<i32>) {
        if let Some(err) = self.generator.on_process_exit(session_id, code) {
            self.publish(ControlEvent::GeneratorStatusChanged(
                GeneratorTransition::Died { code },
            ));
            self.publish(ControlEvent::Error(err.to_string()));
        }
    }

    fn launch_decoder(&mut self) {
        if let Some(previous) = self.decoder.take() {
            if !previous.is_finished() {
                log::warn!(
                    "Replacing decoder generation {} that is still running",
                    previous.generation()
                );
            }
        }

        match self.decoder_launcher.launch() {
            Ok(stream) => {
                self.generation += 1;
                log::info!(
                    "Reading LTC from {} (generation {})",
                    self.decoder_launcher.program(),
                    self.generation
                );
                self.decoder = Some(spawn_read_loop(
                    stream,
                    self.generation,
                    self.signal_timeout,
                    self.grace,
                    self.decoder_tx.clone(),
                ));
                self.publish(ControlEvent::ReaderStatusChanged(ReaderStatus::Reading));
            }
            Err(e) => {
                log::error!("Cannot start LTC reading: {}", e);
                self.publish(ControlEvent::ReaderStatusChanged(ReaderStatus::LaunchFailed(
                    e.to_string(),
                )));
                self.schedule_decoder_restart();
            }
        }
    }

    fn schedule_decoder_restart(&mut self) {
        if !self.auto_restart {
            return;
        }

        log::info!("Restarting decoder in {:?}", self.restart_delay);
        self.restart_at = Some(Instant::now() + self.restart_delay);
        self.publish(ControlEvent::ReaderStatusChanged(ReaderStatus::Restarting));
    }

    fn handle_decoder_message(&mut self, generation: u64, message: DecoderMessage) {
        let current = self.decoder.as_ref().map(DecoderTask::generation);
        if current != Some(generation) {
            log::debug!(
                "Dropping message from stale decoder generation {} (current {:?})",
                generation,
                current
            );
            return;
        }

        match message {
            DecoderMessage::Line(line) => {
                let had_signal = self.reader.state().signal_present;
                if let Some(ReaderEvent::TimecodeObserved(timecode)) = self.reader.on_line(&line) {
                    self.publish(ControlEvent::IncomingTimecode(timecode));
                    if !had_signal {
                        self.publish(ControlEvent::ReaderStatusChanged(
                            ReaderStatus::SignalDetected,
                        ));
                    }
                }
            }
            DecoderMessage::Timeout => {
                let had_signal = self.reader.state().signal_present;
                self.reader.on_read_timeout();
                log::debug!(
                    "{}",
                    LtcError::StreamTimeout {
                        after: self.signal_timeout
                    }
                );
                self.publish_signal_lost(had_signal);
            }
            DecoderMessage::Exited(code) => {
                let had_signal = self.reader.state().signal_present;
                self.reader.on_process_exit(code);
                self.decoder = None;
                self.publish_signal_lost(had_signal);
                self.publish(ControlEvent::ReaderStatusChanged(
                    ReaderStatus::DecoderStopped { code },
                ));
                self.publish(ControlEvent::Error(
                    LtcError::ProcessExited {
                        program: self.decoder_launcher.program().to_string(),
                        code,
                    }
                    .to_string(),
                ));
                self.schedule_decoder_restart();
            }
        }
    }

    fn attach_display(&mut self, mut sink: Box<dyn DisplaySink>) -> DisplayId {
        let id = DisplayId(self.next_display);
        self.next_display += 1;

        let timecode = self
            .last_timecode
            .map(|tc| tc.to_string())
            .unwrap_or_else(|| PLACEHOLDER_TIMECODE.to_string());
        let status = if self.reader.state().signal_present {
            STATUS_READING
        } else {
            STATUS_WAITING
        };
        sink.set_timecode(&timecode);
        sink.set_status(status);

        log::info!("Display {:?} attached", id);
        self.displays.push((id, sink));
        id
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            reader: self.reader.state(),
            decoder_running: self
                .decoder
                .as_ref()
                .is_some_and(|task| !task.is_finished()),
            generator: self.generator.status(),
            generated_timecode: self.generator.tick(),
            paused_timecode: self.generator.session().paused_timecode,
            displays: self.displays.len(),
        }
    }

    fn publish(&mut self, event: ControlEvent) {
        match &event {
            ControlEvent::IncomingTimecode(tc) | ControlEvent::GeneratedTimecode(tc) => {
                self.last_timecode = Some(*tc);
            }
            _ => {}
        }

        for (_, sink) in self.displays.iter_mut() {
            mirror_event(sink.as_mut(), &event);
        }

        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Subscribers hear every loss; mirrors only the present to absent edge.
    fn publish_signal_lost(&mut self, had_signal: bool) {
        if had_signal {
            self.publish(ControlEvent::IncomingSignalLost);
        } else {
            let _ = self.events.send(ControlEvent::IncomingSignalLost);
        }
    }

    async fn shutdown(&mut self) {
        log::info!("Shutting down timecode engine");

        if self.generator.stop().await {
            self.publish(ControlEvent::GeneratorStatusChanged(
                GeneratorTransition::Stopped,
            ));
        }

        self.restart_at = None;
        if let Some(decoder) = self.decoder.take() {
            decoder.stop(self.grace + DECODER_STOP_MARGIN).await;
        }

        self.displays.clear();
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::advance;

    use super::*;
    use crate::display::{SharedDisplay, STATUS_NO_SIGNAL};
    use crate::sim::{SimulatedDecoder, SimulatedEncoder};

    fn tc(text: &str) -> TimeCode {
        TimeCode::parse(text, FrameRate::Fps25).unwrap()
    }

    fn control_loop(
        settings: &Settings,
        encoder: &SimulatedEncoder,
        decoder: &SimulatedDecoder,
    ) -> (ControlLoop, broadcast::Receiver<ControlEvent>) {
        let (_commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, event_rx) = broadcast::channel(EVENT_CAPACITY);
        let control_loop = ControlLoop::new(
            settings,
            Arc::new(encoder.clone()),
            Arc::new(decoder.clone()),
            command_rx,
            events,
        );
        (control_loop, event_rx)
    }

    fn drain(events: &mut broadcast::Receiver<ControlEvent>) -> Vec<ControlEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_decoder_messages_are_dropped() {
        let settings = Settings::default();
        let (encoder, decoder) = (SimulatedEncoder::new(), SimulatedDecoder::new());
        let (mut control, mut events) = control_loop(&settings, &encoder, &decoder);

        control.launch_decoder();
        let first = control.generation;
        control.launch_decoder();
        assert_eq!(control.generation, first + 1);
        drain(&mut events);

        control.handle_decoder_message(first, DecoderMessage::Line("01:00:00:00".to_string()));
        assert!(drain(&mut events).is_empty());
        assert_eq!(control.reader.state().last_timecode, None);

        control.handle_decoder_message(
            first + 1,
            DecoderMessage::Line("01:00:00:00".to_string()),
        );
        assert_eq!(
            drain(&mut events),
            vec![
                ControlEvent::IncomingTimecode(tc("01:00:00:00")),
                ControlEvent::ReaderStatusChanged(ReaderStatus::SignalDetected),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_detected_only_on_transition() {
        let settings = Settings::default();
        let (encoder, decoder) = (SimulatedEncoder::new(), SimulatedDecoder::new());
        let (mut control, mut events) = control_loop(&settings, &encoder, &decoder);
        control.launch_decoder();
        let generation = control.generation;
        drain(&mut events);

        control.handle_decoder_message(generation, DecoderMessage::Line("00:00:00:01".into()));
        control.handle_decoder_message(generation, DecoderMessage::Line("00:00:00:02".into()));
        control.handle_decoder_message(generation, DecoderMessage::Timeout);
        control.handle_decoder_message(generation, DecoderMessage::Line("00:00:05:00".into()));

        let detected = drain(&mut events)
            .into_iter()
            .filter(|e| *e == ControlEvent::ReaderStatusChanged(ReaderStatus::SignalDetected))
            .count();
        assert_eq!(detected, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mirror_shows_signal_loss_once() {
        let settings = Settings::default();
        let (encoder, decoder) = (SimulatedEncoder::new(), SimulatedDecoder::new());
        let (mut control, mut events) = control_loop(&settings, &encoder, &decoder);
        control.launch_decoder();
        let generation = control.generation;

        let display = SharedDisplay::new();
        control.attach_display(Box::new(display.clone()));
        control.start(tc("00:00:00:00")).await.unwrap();
        drain(&mut events);

        control.handle_decoder_message(generation, DecoderMessage::Timeout);
        control.handle_decoder_message(generation, DecoderMessage::Timeout);
        assert_eq!(display.state().status, "GENERATING: 00:00:00:00");

        control.handle_decoder_message(generation, DecoderMessage::Line("05:00:00:00".into()));
        assert_eq!(display.state().status, STATUS_READING);
        control.handle_decoder_message(generation, DecoderMessage::Timeout);
        assert_eq!(display.state().status, STATUS_NO_SIGNAL);

        let updates = display.state().updates;
        control.handle_decoder_message(generation, DecoderMessage::Timeout);
        assert_eq!(display.state().updates, updates);

        let lost = drain(&mut events)
            .into_iter()
            .filter(|e| *e == ControlEvent::IncomingSignalLost)
            .count();
        assert_eq!(lost, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_command_ends_the_loop() {
        let settings = Settings::default();
        let (encoder, decoder) = (SimulatedEncoder::new(), SimulatedDecoder::new());
        let (mut control, _events) = control_loop(&settings, &encoder, &decoder);
        control.launch_decoder();
        control.start(tc("00:00:00:00")).await.unwrap();

        let (reply, snapshot) = oneshot::channel();
        let flow = control.handle_command(ControlCommand::Snapshot { reply }).await;
        assert!(flow.is_continue());
        assert_eq!(snapshot.await.unwrap().generator, GeneratorStatus::Running);

        let (reply, done) = oneshot::channel();
        let flow = control.handle_command(ControlCommand::Shutdown { reply }).await;
        assert!(flow.is_break());
        done.await.unwrap();
        assert_eq!(control.generator.status(), GeneratorStatus::Stopped);
        assert!(control.decoder.is_none());
        assert_eq!(encoder.live_processes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoder_exit_schedules_restart() {
        let settings = Settings {
            auto_restart_decoder: true,
            ..Settings::default()
        };
        let (encoder, decoder) = (SimulatedEncoder::new(), SimulatedDecoder::new());
        let (mut control, mut events) = control_loop(&settings, &encoder, &decoder);
        control.launch_decoder();
        let generation = control.generation;
        drain(&mut events);

        control.handle_decoder_message(generation, DecoderMessage::Exited(Some(1)));
        assert!(control.decoder.is_none());
        assert_eq!(
            control.restart_at,
            Some(Instant::now() + settings.decoder_restart_delay())
        );

        let events = drain(&mut events);
        assert!(events.contains(&ControlEvent::IncomingSignalLost));
        assert!(events.contains(&ControlEvent::ReaderStatusChanged(
            ReaderStatus::DecoderStopped { code: Some(1) }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_follows_last_timecode() {
        let settings = Settings::default();
        let (encoder, decoder) = (SimulatedEncoder::new(), SimulatedDecoder::new());
        let (mut control, _events) = control_loop(&settings, &encoder, &decoder);

        let display = SharedDisplay::new();
        control.attach_display(Box::new(display.clone()));
        assert_eq!(display.state().timecode, PLACEHOLDER_TIMECODE);
        assert_eq!(display.state().status, STATUS_WAITING);

        control.start(tc("02:00:00:00")).await.unwrap();
        advance(Duration::from_millis(400)).await;
        control.on_tick();

        assert_eq!(display.state().timecode, "02:00:00:10");
        assert_eq!(display.state().status, "GENERATING: 02:00:00:00");

        let late = SharedDisplay::new();
        control.attach_display(Box::new(late.clone()));
        assert_eq!(late.state().timecode, "02:00:00:10");
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_while_running_reports_stop() {
        let settings = Settings::default();
        let (encoder, decoder) = (SimulatedEncoder::new(), SimulatedDecoder::new());
        let (mut control, mut events) = control_loop(&settings, &encoder, &decoder);

        control.start(tc("00:00:00:00")).await.unwrap();
        drain(&mut events);

        encoder.fail_next_launch();
        assert!(control.start(tc("01:00:00:00")).await.is_err());

        let events = drain(&mut events);
        assert!(matches!(events[0], ControlEvent::Error(_)));
        assert_eq!(
            events[1],
            ControlEvent::GeneratorStatusChanged(GeneratorTransition::Stopped)
        );
        assert_eq!(control.generator.status(), GeneratorStatus::Stopped);
    }
}
