//! Microphone capture, loudness sampling, smoothing, and voice activity
//! detection.
//!
//! Capture frames arrive on CPAL's callback thread and are handed over a
//! bounded channel; everything downstream runs on the listener's thread and
//! publishes the latest level through a lock-free [`LiveMeter`].

mod dispatch;
mod loudness;
mod meter;
mod pipeline;
mod recorder;
mod segment;
mod smoother;
mod vad;
mod wav;

pub use loudness::{
    metering_loudness, pcm_from_le_bytes, pcm_loudness, LoudnessSample, LoudnessSampler,
    MeteringSource, PcmBufferSource, SampleFrame, SampleSource, SourceEvent, METER_FLOOR_DB,
};
pub use meter::LiveMeter;
pub use pipeline::{
    offline_listen_from_pcm, simulate_levels, ListenMetrics, ListeningPipeline,
    OfflineListenResult, PipelineConfig, PipelineStep, TimedTransition,
};
pub use recorder::{
    CaptureDevice, CaptureGuard, CaptureStream, MicPermission, Recorder, ScriptedCapture,
};
pub(crate) use recorder::mic_permission_hint;
pub use segment::{PcmSegment, SegmentConfig, SegmentEnd, SegmentRecorder};
pub use smoother::{AttackRelease, LoudnessSmoother, SmootherConfig};
pub use vad::{HysteresisVad, VadConfig, VadState, VadTransition};
pub use wav::{decode_wav_bytes, read_wav_i16, write_clip, ClipWriter, RecordingClip};
