//! Background listening runtime.
//!
//! One thread owns the listening pipeline, the session supervisor, and the
//! segment cutter. The caller keeps the native capture (it is not `Send`),
//! feeds recognizer and focus events over a channel, and tears everything
//! down through [`ListenWorker::shutdown`], which enforces the order:
//! supervisor first, then capture, then smoother/VAD reset.
//!
//! While the app is unfocused the runtime is suspended: it asks the caller to
//! pause the capture and discards any frame that still arrives.

use super::clock::Clock;
use super::supervisor::{SessionSupervisor, SpeechRecognizer, SupervisorConfig, SupervisorEvent};
use crate::audio::{
    ListenMetrics, ListeningPipeline, LiveMeter, PcmSegment, PipelineConfig, SampleSource,
    SegmentConfig, SegmentEnd, SegmentRecorder, SourceEvent, TimedTransition,
};
use crate::config::AppConfig;
use crate::error::VoxError;
use crate::log_debug;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

const SHUTDOWN_ACK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerConfig {
    pub pipeline: PipelineConfig,
    pub supervisor: SupervisorConfig,
    pub segments: SegmentConfig,
    pub frame_ms: u64,
    pub sample_rate: u32,
}

impl WorkerConfig {
    pub fn from_app(cfg: &AppConfig, sample_rate: u32) -> Self {
        Self {
            pipeline: PipelineConfig::from(cfg),
            supervisor: SupervisorConfig::from(cfg),
            segments: SegmentConfig::from(cfg),
            frame_ms: cfg.frame_ms,
            sample_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenCommand {
    RecognizerResult { text: String, is_final: bool },
    RecognizerError(String),
    Focus(bool),
    Shutdown,
    CaptureReleased { dropped_frames: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListenMessage {
    Vad(TimedTransition),
    Supervisor(SupervisorEvent),
    /// A hands-free speech segment closed by silence or length.
    Segment(PcmSegment),
    /// Focus was lost; the caller should pause the native capture.
    CaptureSuspended,
    /// Focus came back; the caller should resume the native capture.
    CaptureResumed,
    SupervisorStopped,
}

/// Handle for the listening thread.
pub struct ListenWorker {
    commands: Sender<ListenCommand>,
    pub messages: Receiver<ListenMessage>,
    handle: Option<thread::JoinHandle<ListenMetrics>>,
}

impl ListenWorker {
    pub fn report_result(&self, text: &str, is_final: bool) {
        self.send(ListenCommand::RecognizerResult {
            text: text.to_string(),
            is_final,
        });
    }

    pub fn report_error(&self, message: &str) {
        self.send(ListenCommand::RecognizerError(message.to_string()));
    }

    pub fn set_focus(&self, focused: bool) {
        self.send(ListenCommand::Focus(focused));
    }

    fn send(&self, command: ListenCommand) {
        if self.commands.send(command).is_err() {
            log_debug("listen worker already exited; command dropped");
        }
    }

    /// Stop listening. `release_capture` runs after the supervisor has
    /// stopped and must release the native stream, returning how many frames
    /// it dropped.
    pub fn shutdown<F>(mut self, release_capture: F) -> ListenMetrics
    where
        F: FnOnce() -> usize,
    {
        self.send(ListenCommand::Shutdown);
        let deadline = std::time::Instant::now() + SHUTDOWN_ACK_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.messages.recv_timeout(remaining) {
                Ok(ListenMessage::SupervisorStopped) => break,
                Ok(_) => continue,
                Err(_) => {
                    log_debug("listen worker did not acknowledge shutdown");
                    break;
                }
            }
        }
        let dropped_frames = release_capture();
        self.send(ListenCommand::CaptureReleased { dropped_frames });
        match self.handle.take().map(|handle| handle.join()) {
            Some(Ok(metrics)) => metrics,
            Some(Err(_)) => {
                log_debug("listen worker panicked during shutdown");
                ListenMetrics::default()
            }
            None => ListenMetrics::default(),
        }
    }
}

impl Drop for ListenWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.commands.send(ListenCommand::Shutdown);
            let _ = self.commands.send(ListenCommand::CaptureReleased { dropped_frames: 0 });
        }
    }
}

/// Start listening on a background thread.
pub fn spawn_listen_worker<S, R, C>(
    cfg: WorkerConfig,
    source: S,
    recognizer: R,
    clock: C,
    meter: LiveMeter,
) -> ListenWorker
where
    S: SampleSource + 'static,
    R: SpeechRecognizer + Send + 'static,
    C: Clock + 'static,
{
    let (command_tx, command_rx) = unbounded();
    let (message_tx, message_rx) = bounded(256);
    let handle = thread::spawn(move || {
        let mut runtime = ListenRuntime::new(cfg, recognizer, meter, message_tx);
        runtime.run(source, &command_rx, &clock)
    });
    ListenWorker {
        commands: command_tx,
        messages: message_rx,
        handle: Some(handle),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Listening,
    Suspended,
    Draining,
}

struct ListenRuntime<R: SpeechRecognizer> {
    cfg: WorkerConfig,
    pipeline: ListeningPipeline,
    supervisor: SessionSupervisor<R>,
    segments: SegmentRecorder,
    messages: Sender<ListenMessage>,
    phase: Phase,
    suspended_frames: u64,
}

impl<R: SpeechRecognizer> ListenRuntime<R> {
    fn new(
        cfg: WorkerConfig,
        recognizer: R,
        meter: LiveMeter,
        messages: Sender<ListenMessage>,
    ) -> Self {
        Self {
            pipeline: ListeningPipeline::new(cfg.pipeline, meter),
            supervisor: SessionSupervisor::new(cfg.supervisor, recognizer),
            segments: SegmentRecorder::new(&cfg.segments, cfg.sample_rate),
            messages,
            phase: Phase::Listening,
            suspended_frames: 0,
            cfg,
        }
    }

    fn run<S: SampleSource, C: Clock>(
        &mut self,
        mut source: S,
        commands: &Receiver<ListenCommand>,
        clock: &C,
    ) -> ListenMetrics {
        let poll = Duration::from_millis(self.cfg.frame_ms.max(1));
        let mut source_open = true;
        self.pipeline.meter().set_active(true);
        self.supervisor.start_listening(clock.now_ms());
        self.forward_supervisor_events();
        log_debug(&format!("listen worker started (source={})", source.name()));

        loop {
            loop {
                match commands.try_recv() {
                    Ok(command) => {
                        if let Some(metrics) = self.handle_command(command, clock.now_ms()) {
                            return metrics;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return self.finish(0),
                }
            }

            if source_open {
                match source.next_event(poll) {
                    SourceEvent::Sample { loudness, pcm } => match self.phase {
                        Phase::Listening => self.on_sample(loudness, pcm, clock.now_ms()),
                        Phase::Suspended => self.suspended_frames += 1,
                        Phase::Draining => {}
                    },
                    SourceEvent::Idle => {}
                    SourceEvent::Closed => {
                        log_debug("listen worker: capture source closed");
                        source_open = false;
                    }
                }
            } else {
                match commands.recv_timeout(poll) {
                    Ok(command) => {
                        if let Some(metrics) = self.handle_command(command, clock.now_ms()) {
                            return metrics;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => return self.finish(0),
                }
            }

            if self.phase == Phase::Listening {
                self.supervisor.tick(clock.now_ms());
                self.forward_supervisor_events();
            }
        }
    }

    fn on_sample(&mut self, loudness: f32, pcm: Option<Vec<i16>>, now_ms: u64) {
        let step = self.pipeline.process(loudness, now_ms);
        if let Some(transition) = step.transition {
            self.emit(ListenMessage::Vad(TimedTransition {
                at_ms: now_ms,
                transition,
                smoothed: step.smoothed,
            }));
            if transition == crate::audio::VadTransition::SpeechEnded {
                self.supervisor.on_vad_finalize(now_ms);
                self.forward_supervisor_events();
            }
        }
        if let Some(frame) = pcm {
            let voiced = step.voiced(&self.cfg.pipeline.vad);
            if let Some(segment) = self.segments.push(frame, voiced, step.transition) {
                self.emit(ListenMessage::Segment(segment));
            }
        }
    }

    fn handle_command(&mut self, command: ListenCommand, now_ms: u64) -> Option<ListenMetrics> {
        match command {
            ListenCommand::RecognizerResult { text, is_final } => {
                self.supervisor.on_result(now_ms, &text, is_final);
            }
            ListenCommand::RecognizerError(message) => {
                self.supervisor
                    .on_recognizer_error(now_ms, &VoxError::Recognizer(message));
            }
            ListenCommand::Focus(focused) => {
                self.supervisor.on_focus_change(now_ms, focused);
                match (self.phase, focused) {
                    (Phase::Listening, false) => {
                        self.phase = Phase::Suspended;
                        self.pipeline.reset();
                        self.segments.reset();
                        self.pipeline.meter().set_active(false);
                        self.emit(ListenMessage::CaptureSuspended);
                    }
                    (Phase::Suspended, true) => {
                        if self.suspended_frames > 0 {
                            log_debug(&format!(
                                "listen worker: discarded {} frames while unfocused",
                                self.suspended_frames
                            ));
                            self.suspended_frames = 0;
                        }
                        self.phase = Phase::Listening;
                        self.pipeline.meter().set_active(true);
                        self.emit(ListenMessage::CaptureResumed);
                    }
                    _ => {}
                }
            }
            ListenCommand::Shutdown => {
                self.supervisor.stop_listening();
                self.forward_supervisor_events();
                self.phase = Phase::Draining;
                self.emit(ListenMessage::SupervisorStopped);
            }
            ListenCommand::CaptureReleased { dropped_frames } => {
                return Some(self.finish(dropped_frames));
            }
        }
        self.forward_supervisor_events();
        None
    }

    fn finish(&mut self, dropped_frames: usize) -> ListenMetrics {
        if self.supervisor.is_listening() {
            self.supervisor.stop_listening();
        }
        if let Some(segment) = self.segments.flush() {
            if segment.end == SegmentEnd::Flushed {
                log_debug(&format!(
                    "discarding {}ms of unfinished speech at shutdown",
                    segment.duration_ms()
                ));
            }
        }
        self.pipeline.note_dropped(dropped_frames);
        self.pipeline.reset();
        let metrics = self.pipeline.take_metrics();
        log_listen_metrics(&metrics);
        metrics
    }

    fn forward_supervisor_events(&mut self) {
        for event in self.supervisor.drain_events() {
            self.emit(ListenMessage::Supervisor(event));
        }
    }

    fn emit(&self, message: ListenMessage) {
        if let Err(err) = self.messages.try_send(message) {
            log_debug(&format!("listen worker: message dropped ({err})"));
        }
    }
}

pub fn log_listen_metrics(metrics: &ListenMetrics) {
    log_debug(&format!(
        "listen_metrics|frames={}|dropped={}|segments={}|speech_ms={}|listen_ms={}",
        metrics.frames_processed,
        metrics.frames_dropped,
        metrics.speech_segments,
        metrics.speech_ms,
        metrics.listen_ms
    ));
    tracing::info!(
        target: "voxorb::session",
        frames = metrics.frames_processed,
        dropped = metrics.frames_dropped,
        segments = metrics.speech_segments,
        speech_ms = metrics.speech_ms,
        listen_ms = metrics.listen_ms,
        "listen session ended"
    );
}
