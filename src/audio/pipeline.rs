//! Sampler → smoother → VAD chain for one listening session.
//!
//! Samples must be processed in arrival order with non-decreasing
//! timestamps; the VAD dwell timers depend on it. The smoothed level and
//! the visual envelope are published to a [`LiveMeter`] after every step.

use super::loudness::{LoudnessSample, LoudnessSampler, SampleFrame};
use super::meter::LiveMeter;
use super::segment::{PcmSegment, SegmentConfig, SegmentRecorder};
use super::smoother::{AttackRelease, LoudnessSmoother, SmootherConfig};
use super::vad::{HysteresisVad, VadConfig, VadState, VadTransition};
use crate::config::{AppConfig, DEFAULT_LOUDNESS_GAIN};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub gain: f32,
    pub smoother: SmootherConfig,
    pub vad: VadConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gain: DEFAULT_LOUDNESS_GAIN,
            smoother: SmootherConfig::default(),
            vad: VadConfig::default(),
        }
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            gain: cfg.loudness_gain,
            smoother: SmootherConfig::from(cfg),
            vad: VadConfig::from(cfg),
        }
    }
}

/// Counters for one listening session, logged when it ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenMetrics {
    pub frames_processed: usize,
    pub frames_dropped: usize,
    pub speech_segments: usize,
    pub speech_ms: u64,
    pub listen_ms: u64,
}

/// Everything one sample produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineStep {
    pub loudness: LoudnessSample,
    pub smoothed: f32,
    pub visual: f32,
    pub state: VadState,
    pub transition: Option<VadTransition>,
}

impl PipelineStep {
    /// Whether the frame counts as voiced for silence trimming.
    pub fn voiced(&self, cfg: &VadConfig) -> bool {
        self.smoothed >= cfg.down_threshold
    }
}

pub struct ListeningPipeline {
    cfg: PipelineConfig,
    sampler: LoudnessSampler,
    smoother: LoudnessSmoother,
    envelope: AttackRelease,
    vad: HysteresisVad,
    meter: LiveMeter,
    metrics: ListenMetrics,
    first_sample_at: Option<u64>,
    speech_started_at: Option<u64>,
}

impl ListeningPipeline {
    pub fn new(cfg: PipelineConfig, meter: LiveMeter) -> Self {
        Self {
            sampler: LoudnessSampler::new(cfg.gain),
            smoother: LoudnessSmoother::new(&cfg.smoother),
            envelope: AttackRelease::from(&cfg.smoother),
            vad: HysteresisVad::new(cfg.vad),
            meter,
            metrics: ListenMetrics::default(),
            first_sample_at: None,
            speech_started_at: None,
            cfg,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn sampler(&self) -> LoudnessSampler {
        self.sampler
    }

    pub fn meter(&self) -> &LiveMeter {
        &self.meter
    }

    pub fn state(&self) -> VadState {
        self.vad.state()
    }

    pub fn metrics(&self) -> &ListenMetrics {
        &self.metrics
    }

    pub fn note_dropped(&mut self, frames: usize) {
        self.metrics.frames_dropped = frames;
    }

    /// Convert a raw frame and run it through the chain.
    pub fn process_frame(&mut self, frame: SampleFrame<'_>, now_ms: u64) -> PipelineStep {
        let loudness = self.sampler.sample(frame);
        self.process(loudness, now_ms)
    }

    /// Run one already-sampled loudness value through smoother and VAD.
    pub fn process(&mut self, loudness: LoudnessSample, now_ms: u64) -> PipelineStep {
        let smoothed = self.smoother.push(loudness);
        let visual = self.envelope.push(loudness);
        let transition = self.vad.update(smoothed, now_ms);
        self.meter.publish(smoothed, visual);

        let first = *self.first_sample_at.get_or_insert(now_ms);
        self.metrics.frames_processed += 1;
        self.metrics.listen_ms = now_ms.saturating_sub(first);
        match transition {
            Some(VadTransition::SpeechStarted) => {
                self.metrics.speech_segments += 1;
                self.speech_started_at = Some(now_ms);
                tracing::debug!(target: "voxorb::vad", now_ms, smoothed, "speech started");
            }
            Some(VadTransition::SpeechEnded) => {
                if let Some(started) = self.speech_started_at.take() {
                    self.metrics.speech_ms += now_ms.saturating_sub(started);
                }
                tracing::debug!(target: "voxorb::vad", now_ms, smoothed, "speech ended");
            }
            None => {}
        }

        PipelineStep {
            loudness,
            smoothed,
            visual,
            state: self.vad.state(),
            transition,
        }
    }

    /// Clear smoother, envelope, and VAD so the next session starts from
    /// silence, and zero the shared meter.
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.envelope.reset();
        self.vad.reset();
        self.meter.reset();
        self.first_sample_at = None;
        self.speech_started_at = None;
    }

    /// Hand back the metrics for the session that just ended and start fresh.
    pub fn take_metrics(&mut self) -> ListenMetrics {
        std::mem::take(&mut self.metrics)
    }
}

/// A transition with the virtual time it fired at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedTransition {
    pub at_ms: u64,
    pub transition: VadTransition,
    pub smoothed: f32,
}

/// Feed a loudness sequence spaced `step_ms` apart through a fresh pipeline.
pub fn simulate_levels(
    levels: &[f32],
    step_ms: u64,
    cfg: PipelineConfig,
) -> (Vec<TimedTransition>, ListenMetrics) {
    let mut pipeline = ListeningPipeline::new(cfg, LiveMeter::new());
    let mut transitions = Vec::new();
    for (idx, &level) in levels.iter().enumerate() {
        let now = idx as u64 * step_ms;
        let step = pipeline.process(level, now);
        if let Some(transition) = step.transition {
            transitions.push(TimedTransition {
                at_ms: now,
                transition,
                smoothed: step.smoothed,
            });
        }
    }
    (transitions, pipeline.take_metrics())
}

/// Result of replaying recorded PCM through the listening chain.
#[derive(Debug, Clone, Default)]
pub struct OfflineListenResult {
    pub transitions: Vec<TimedTransition>,
    pub segments: Vec<PcmSegment>,
    pub metrics: ListenMetrics,
}

/// Run the listening chain and segment cutter over PCM without a device.
pub fn offline_listen_from_pcm(
    samples: &[i16],
    sample_rate: u32,
    frame_ms: u64,
    cfg: PipelineConfig,
    segment_cfg: &SegmentConfig,
) -> OfflineListenResult {
    let frame_samples = ((u64::from(sample_rate) * frame_ms) / 1000).max(1) as usize;
    let mut pipeline = ListeningPipeline::new(cfg, LiveMeter::new());
    let mut segmenter = SegmentRecorder::new(segment_cfg, sample_rate);
    let mut result = OfflineListenResult::default();

    for (idx, chunk) in samples.chunks(frame_samples).enumerate() {
        let now = idx as u64 * frame_ms;
        let step = pipeline.process_frame(SampleFrame::Pcm(chunk), now);
        if let Some(transition) = step.transition {
            result.transitions.push(TimedTransition {
                at_ms: now,
                transition,
                smoothed: step.smoothed,
            });
        }
        let voiced = step.voiced(&cfg.vad);
        if let Some(segment) = segmenter.push(chunk.to_vec(), voiced, step.transition) {
            result.segments.push(segment);
        }
    }
    if let Some(segment) = segmenter.flush() {
        result.segments.push(segment);
    }
    result.metrics = pipeline.take_metrics();
    result
}
