//! Push-to-toggle recording, upload, and reply playback.
//!
//! The controller lives on the caller's thread (it owns the native capture
//! guard and the playback sink). Frames are drained into the clip on a writer
//! thread, uploads run as a one-shot background job, and `poll` applies the
//! job's result only if the controller has not been torn down since.

use crate::audio::{
    AttackRelease, CaptureDevice, CaptureGuard, ClipWriter, LiveMeter, LoudnessSampler,
    LoudnessSmoother, MicPermission, PcmSegment, RecordingClip, SmootherConfig,
};
use crate::config::AppConfig;
use crate::error::{VoxError, VoxResult};
use crate::upload::{
    open_playback, AudioCache, ClipUploader, ConversationStore, PlaybackSink, ReplyAudio,
    ReplyMetadata, UploadSettings, VoiceClient,
};
use crate::{log_debug, log_debug_content};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

const WRITER_POLL: Duration = Duration::from_millis(50);
const AUDIO_SUBDIR: &str = "audio";

/// Capture-side knobs for recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    pub frame_ms: u64,
    pub channel_capacity: usize,
    pub gain: f32,
    pub smoother: SmootherConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            frame_ms: crate::config::DEFAULT_FRAME_MS,
            channel_capacity: crate::config::DEFAULT_CHANNEL_CAPACITY,
            gain: crate::config::DEFAULT_LOUDNESS_GAIN,
            smoother: SmootherConfig::default(),
        }
    }
}

impl From<&AppConfig> for ControllerConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            frame_ms: cfg.frame_ms,
            channel_capacity: cfg.channel_capacity,
            gain: cfg.loudness_gain,
            smoother: SmootherConfig::from(cfg),
        }
    }
}

/// What the status line shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Recording,
    Finishing,
    Uploading,
    Downloading,
    Captions(String),
    Failed(String),
}

impl Phase {
    pub fn caption(&self) -> String {
        match self {
            Phase::Ready => "Tap the orb to start/stop.".to_string(),
            Phase::Recording => "Recording… (tap to stop)".to_string(),
            Phase::Finishing => "Finishing…".to_string(),
            Phase::Uploading => "Uploading to backend…".to_string(),
            Phase::Downloading => "Downloading reply…".to_string(),
            Phase::Captions(text) => format!("Captions: {text}"),
            Phase::Failed(caption) => caption.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started,
    /// Recording stopped and the clip went out for upload.
    Submitted,
    /// Ignored because an upload is still running.
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    Replied {
        metadata: ReplyMetadata,
        saved: PathBuf,
    },
    Failed {
        kind: &'static str,
        caption: String,
    },
}

struct ActiveRecording {
    guard: CaptureGuard,
    stop: Arc<AtomicBool>,
    writer: thread::JoinHandle<VoxResult<RecordingClip>>,
    started: Instant,
}

struct UploadJob {
    receiver: mpsc::Receiver<VoxResult<ReplyAudio>>,
    handle: Option<thread::JoinHandle<()>>,
    generation: u64,
}

pub struct RecordingController<D: CaptureDevice> {
    device: D,
    cfg: ControllerConfig,
    settings: UploadSettings,
    uploader: Arc<dyn ClipUploader>,
    playback: Box<dyn PlaybackSink>,
    store: ConversationStore,
    cache: AudioCache,
    meter: LiveMeter,
    phase: Phase,
    recording: Option<ActiveRecording>,
    upload: Option<UploadJob>,
    generation: u64,
    alive: bool,
}

impl<D: CaptureDevice> RecordingController<D> {
    pub fn new(
        device: D,
        cfg: ControllerConfig,
        settings: UploadSettings,
        uploader: Arc<dyn ClipUploader>,
        playback: Box<dyn PlaybackSink>,
        meter: LiveMeter,
    ) -> Self {
        let store = ConversationStore::open(&settings.state_dir);
        let cache = AudioCache::new(
            settings.state_dir.join(AUDIO_SUBDIR),
            settings.max_cache_files,
        );
        Self {
            device,
            cfg,
            settings,
            uploader,
            playback,
            store,
            cache,
            meter,
            phase: Phase::Ready,
            recording: None,
            upload: None,
            generation: 0,
            alive: true,
        }
    }

    /// Wire the controller against the real voice endpoint and output device.
    pub fn from_app(app: &AppConfig, device: D, meter: LiveMeter) -> VoxResult<Self> {
        let settings = UploadSettings::from(app);
        let client = VoiceClient::new(&settings.backend_url, settings.timeout)?;
        let playback = open_playback(settings.playback);
        Ok(Self::new(
            device,
            ControllerConfig::from(app),
            settings,
            Arc::new(client),
            playback,
            meter,
        ))
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn caption(&self) -> String {
        self.phase.caption()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.upload.is_some()
    }

    pub fn meter(&self) -> &LiveMeter {
        &self.meter
    }

    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    pub fn conversation_store(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn playback(&self) -> &dyn PlaybackSink {
        self.playback.as_ref()
    }

    /// Start or stop recording. Taps during an upload are ignored.
    pub fn toggle(&mut self) -> VoxResult<ToggleOutcome> {
        if self.is_busy() {
            log_debug("toggle ignored: upload in progress");
            return Ok(ToggleOutcome::Busy);
        }
        if self.is_recording() {
            self.stop_recording()?;
            Ok(ToggleOutcome::Submitted)
        } else {
            self.start_recording()?;
            Ok(ToggleOutcome::Started)
        }
    }

    pub fn start_recording(&mut self) -> VoxResult<()> {
        if self.recording.is_some() {
            return Ok(());
        }
        self.playback.stop();
        match self.open_recording() {
            Ok(active) => {
                self.recording = Some(active);
                self.phase = Phase::Recording;
                tracing::info!(
                    target: "voxorb::upload",
                    device = %self.device.name(),
                    "recording started"
                );
                Ok(())
            }
            Err(err) => {
                self.meter.set_active(false);
                Err(self.fail(err))
            }
        }
    }

    fn open_recording(&mut self) -> VoxResult<ActiveRecording> {
        if self.device.request_permission() == MicPermission::Denied {
            return Err(VoxError::PermissionDenied(format!(
                "microphone access for {}",
                self.device.name()
            )));
        }
        let stream = self
            .device
            .open(self.cfg.frame_ms, self.cfg.channel_capacity)?;
        self.cache.ensure_dir()?;
        let writer = ClipWriter::create(self.cache.recording_path(), stream.sample_rate())?;
        let (frames, guard) = stream.split();

        let stop = Arc::new(AtomicBool::new(false));
        let levels = LevelTracker::new(&self.cfg, self.meter.clone());
        self.meter.set_active(true);
        let stop_flag = Arc::clone(&stop);
        let writer = thread::spawn(move || drain_frames(frames, writer, stop_flag, levels));
        Ok(ActiveRecording {
            guard,
            stop,
            writer,
            started: Instant::now(),
        })
    }

    /// Finalize the clip and send it to the backend.
    pub fn stop_recording(&mut self) -> VoxResult<()> {
        let Some(active) = self.recording.take() else {
            return Ok(());
        };
        self.phase = Phase::Finishing;
        let clip = self.finish_recording(active);
        match clip {
            Ok(clip) => self.submit_clip(clip),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn finish_recording(&mut self, active: ActiveRecording) -> VoxResult<RecordingClip> {
        active.stop.store(true, Ordering::Relaxed);
        let dropped = active.guard.stop();
        let result = match active.writer.join() {
            Ok(result) => result,
            Err(_) => Err(VoxError::Capture("recording writer panicked".to_string())),
        };
        // Stale energy must not carry into the next recording.
        self.meter.reset();
        self.meter.set_active(false);
        log_debug(&format!(
            "recording stopped after {}ms (dropped_frames={dropped})",
            active.started.elapsed().as_millis()
        ));
        result
    }

    /// Upload a hands-free speech segment the same way as a recorded clip.
    pub fn submit_segment(&mut self, segment: &PcmSegment) -> VoxResult<()> {
        if self.is_busy() {
            log_debug("segment skipped: upload in progress");
            return Ok(());
        }
        self.cache.ensure_dir()?;
        let clip = crate::audio::write_clip(
            self.cache.recording_path(),
            &segment.samples,
            segment.sample_rate,
        );
        match clip {
            Ok(clip) => self.submit_clip(clip),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn submit_clip(&mut self, clip: RecordingClip) -> VoxResult<()> {
        let conversation_id = match self
            .store
            .ensure_conversation_id(self.settings.conversation_override.as_deref())
        {
            Ok(id) => id,
            Err(err) => {
                clip.discard();
                return Err(self.fail(err));
            }
        };
        let ctx = self.settings.context(&conversation_id);
        let uploader = Arc::clone(&self.uploader);
        let (tx, rx) = mpsc::sync_channel(1);
        self.generation += 1;
        let generation = self.generation;
        let handle = thread::spawn(move || {
            let result = uploader.upload(&clip, &ctx);
            // The clip is consumed exactly once, whatever the outcome.
            clip.discard();
            let _ = tx.send(result);
        });
        self.upload = Some(UploadJob {
            receiver: rx,
            handle: Some(handle),
            generation,
        });
        self.phase = Phase::Uploading;
        Ok(())
    }

    /// Apply a finished upload, if any. Always leaves the controller idle
    /// once the job is done.
    pub fn poll(&mut self) -> Option<ControllerEvent> {
        let job = self.upload.as_mut()?;
        let result = match job.receiver.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return None,
            Err(mpsc::TryRecvError::Disconnected) => {
                Err(VoxError::Network("upload worker exited without a result".to_string()))
            }
        };
        let mut job = self.upload.take()?;
        if let Some(handle) = job.handle.take() {
            let _ = handle.join();
        }
        if !self.alive || job.generation != self.generation {
            log_debug("discarding upload result from a torn-down session");
            return None;
        }
        Some(match result.and_then(|reply| self.apply_reply(reply)) {
            Ok(event) => event,
            Err(err) => {
                let err = self.fail(err);
                ControllerEvent::Failed {
                    kind: err.label(),
                    caption: err.caption(),
                }
            }
        })
    }

    /// Poll until the running upload finishes or `timeout` passes.
    pub fn wait_for_upload(&mut self, timeout: Duration) -> Option<ControllerEvent> {
        let deadline = Instant::now() + timeout;
        while self.is_busy() && Instant::now() < deadline {
            if let Some(event) = self.poll() {
                return Some(event);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    fn apply_reply(&mut self, reply: ReplyAudio) -> VoxResult<ControllerEvent> {
        self.phase = match &reply.metadata.reply_text {
            Some(text) => Phase::Captions(text.clone()),
            None => Phase::Downloading,
        };
        if let Some(text) = &reply.metadata.reply_text {
            log_debug_content(&format!("reply text: {text}"));
        }
        if let Some(text) = &reply.metadata.transcript {
            log_debug_content(&format!("transcript: {text}"));
        }
        let saved = reply.save(&self.cache)?;
        self.playback.play(&reply)?;
        tracing::info!(
            target: "voxorb::upload",
            language = reply.metadata.language.as_deref().unwrap_or(""),
            voice = reply.metadata.voice_id.as_deref().unwrap_or(""),
            sink = self.playback.name(),
            "reply playing"
        );
        Ok(ControllerEvent::Replied {
            metadata: reply.metadata,
            saved,
        })
    }

    fn fail(&mut self, err: VoxError) -> VoxError {
        self.phase = Phase::Failed(err.caption());
        log_debug(&format!("controller error ({}): {err}", err.label()));
        tracing::warn!(target: "voxorb::upload", kind = err.label(), "controller action failed");
        err
    }

    /// Tear down: drop any recording, stop playback, and make sure a pending
    /// upload's result is never applied.
    pub fn shutdown(&mut self) {
        self.alive = false;
        self.generation += 1;
        if let Some(active) = self.recording.take() {
            if let Ok(clip) = self.finish_recording(active) {
                clip.discard();
            }
        }
        self.playback.stop();
        self.meter.reset();
    }
}

impl<D: CaptureDevice> Drop for RecordingController<D> {
    fn drop(&mut self) {
        if self.alive {
            self.shutdown();
        }
    }
}

/// Loudness path for the live meter while recording.
struct LevelTracker {
    sampler: LoudnessSampler,
    smoother: LoudnessSmoother,
    envelope: AttackRelease,
    meter: LiveMeter,
}

impl LevelTracker {
    fn new(cfg: &ControllerConfig, meter: LiveMeter) -> Self {
        Self {
            sampler: LoudnessSampler::new(cfg.gain),
            smoother: LoudnessSmoother::new(&cfg.smoother),
            envelope: AttackRelease::from(&cfg.smoother),
            meter,
        }
    }

    fn observe(&mut self, frame: &[i16]) {
        let level = self.sampler.sample(crate::audio::SampleFrame::Pcm(frame));
        let smoothed = self.smoother.push(level);
        let visual = self.envelope.push(level);
        self.meter.publish(smoothed, visual);
    }
}

fn drain_frames(
    frames: Receiver<Vec<i16>>,
    mut writer: ClipWriter,
    stop: Arc<AtomicBool>,
    mut levels: LevelTracker,
) -> VoxResult<RecordingClip> {
    loop {
        if stop.load(Ordering::Relaxed) {
            loop {
                match frames.try_recv() {
                    Ok(frame) => writer.write_frame(&frame)?,
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
            break;
        }
        match frames.recv_timeout(WRITER_POLL) {
            Ok(frame) => {
                levels.observe(&frame);
                writer.write_frame(&frame)?;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    writer.finish()
}

#[cfg(test)]
mod tests;
