//! Loudness sampling: one bounded [0, 1] value per capture frame.
//!
//! Two capture shapes feed the same pipeline. PCM backends hand over signed
//! 16-bit frames; metering backends only report a dBFS level. Both are
//! wrapped as a [`SampleSource`] so smoothing and VAD are written once.

use crate::config::DEFAULT_LOUDNESS_GAIN;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Metering values at or below this level are treated as silence.
pub const METER_FLOOR_DB: f32 = -60.0;

const PCM_FULL_SCALE: f32 = 32_768.0;

/// Normalized loudness of one frame, always within [0, 1].
pub type LoudnessSample = f32;

/// RMS of a signed 16-bit frame scaled by `gain` and clamped into [0, 1].
pub fn pcm_loudness(frame: &[i16], gain: f32) -> LoudnessSample {
    if frame.is_empty() {
        return 0.0;
    }
    let energy: f32 = frame
        .iter()
        .map(|&s| {
            let v = f32::from(s) / PCM_FULL_SCALE;
            v * v
        })
        .sum::<f32>()
        / frame.len() as f32;
    clamp_unit(energy.sqrt() * gain)
}

/// Convert a dBFS metering value to linear amplitude, apply `gain`, clamp.
/// Missing or non-finite readings count as silence.
pub fn metering_loudness(db: Option<f32>, gain: f32) -> LoudnessSample {
    let Some(db) = db.filter(|v| v.is_finite()) else {
        return 0.0;
    };
    if db <= METER_FLOOR_DB {
        return 0.0;
    }
    let linear = 10f32.powf(db.min(0.0) / 20.0);
    clamp_unit(linear * gain)
}

/// Decode little-endian 16-bit PCM bytes into samples. A trailing odd byte is ignored.
pub fn pcm_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// A raw capture frame in either supported shape.
#[derive(Debug, Clone, Copy)]
pub enum SampleFrame<'a> {
    Pcm(&'a [i16]),
    Metering(Option<f32>),
}

/// Stateless converter holding the configured gain.
#[derive(Debug, Clone, Copy)]
pub struct LoudnessSampler {
    gain: f32,
}

impl LoudnessSampler {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn sample(&self, frame: SampleFrame<'_>) -> LoudnessSample {
        match frame {
            SampleFrame::Pcm(samples) => pcm_loudness(samples, self.gain),
            SampleFrame::Metering(db) => metering_loudness(db, self.gain),
        }
    }
}

impl Default for LoudnessSampler {
    fn default() -> Self {
        Self::new(DEFAULT_LOUDNESS_GAIN)
    }
}

/// What a source produced while being polled.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// One frame's loudness, plus the PCM itself when the backend has it.
    Sample {
        loudness: LoudnessSample,
        pcm: Option<Vec<i16>>,
    },
    /// Nothing arrived within the timeout.
    Idle,
    /// The producer hung up; no more frames will arrive.
    Closed,
}

/// Capture backend that emits loudness samples in arrival order.
pub trait SampleSource: Send {
    fn next_event(&mut self, timeout: Duration) -> SourceEvent;

    fn name(&self) -> &'static str {
        "unknown_source"
    }
}

/// Source fed by 16-bit PCM frames from a capture callback.
pub struct PcmBufferSource {
    receiver: Receiver<Vec<i16>>,
    sampler: LoudnessSampler,
}

impl PcmBufferSource {
    pub fn new(receiver: Receiver<Vec<i16>>, sampler: LoudnessSampler) -> Self {
        Self { receiver, sampler }
    }
}

impl SampleSource for PcmBufferSource {
    fn next_event(&mut self, timeout: Duration) -> SourceEvent {
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => SourceEvent::Sample {
                loudness: self.sampler.sample(SampleFrame::Pcm(&frame)),
                pcm: Some(frame),
            },
            Err(RecvTimeoutError::Timeout) => SourceEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => SourceEvent::Closed,
        }
    }

    fn name(&self) -> &'static str {
        "pcm_buffer"
    }
}

/// Source fed by decibel metering callbacks (no PCM available).
pub struct MeteringSource {
    receiver: Receiver<Option<f32>>,
    sampler: LoudnessSampler,
}

impl MeteringSource {
    /// Create a source plus the sender a metering callback should push dBFS readings into.
    pub fn channel(capacity: usize, sampler: LoudnessSampler) -> (Sender<Option<f32>>, Self) {
        let (sender, receiver) = bounded(capacity.max(1));
        (sender, Self { receiver, sampler })
    }
}

impl SampleSource for MeteringSource {
    fn next_event(&mut self, timeout: Duration) -> SourceEvent {
        match self.receiver.recv_timeout(timeout) {
            Ok(db) => SourceEvent::Sample {
                loudness: self.sampler.sample(SampleFrame::Metering(db)),
                pcm: None,
            },
            Err(RecvTimeoutError::Timeout) => SourceEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => SourceEvent::Closed,
        }
    }

    fn name(&self) -> &'static str {
        "metering"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_frame(amplitude: f32, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let phase = i as f32 * 2.0 * std::f32::consts::PI * 440.0 / 16_000.0;
                (phase.sin() * amplitude * 32_767.0) as i16
            })
            .collect()
    }

    #[test]
    fn silence_maps_to_zero() {
        assert_eq!(pcm_loudness(&[0i16; 320], 2.5), 0.0);
        assert_eq!(pcm_loudness(&[], 2.5), 0.0);
        assert_eq!(metering_loudness(Some(-60.0), 2.5), 0.0);
        assert_eq!(metering_loudness(Some(-90.0), 2.5), 0.0);
    }

    #[test]
    fn invalid_metering_values_are_silence() {
        assert_eq!(metering_loudness(None, 2.5), 0.0);
        assert_eq!(metering_loudness(Some(f32::NAN), 2.5), 0.0);
        assert_eq!(metering_loudness(Some(f32::INFINITY), 2.5), 0.0);
        assert_eq!(metering_loudness(Some(f32::NEG_INFINITY), 2.5), 0.0);
    }

    #[test]
    fn outputs_stay_in_unit_range() {
        for amplitude in [0.0f32, 0.01, 0.1, 0.3, 0.5, 0.9, 1.0] {
            let value = pcm_loudness(&sine_frame(amplitude, 640), 2.5);
            assert!((0.0..=1.0).contains(&value), "amplitude {amplitude} -> {value}");
        }
        let extremes = [i16::MIN; 64];
        assert_eq!(pcm_loudness(&extremes, 2.5), 1.0);
        for db in -120..=12 {
            let value = metering_loudness(Some(db as f32), 2.5);
            assert!((0.0..=1.0).contains(&value), "db {db} -> {value}");
        }
    }

    #[test]
    fn pcm_rms_applies_gain() {
        // Constant 0.1 full-scale frame has RMS 0.1, so 2.5x gain gives 0.25.
        let frame = [3_277i16; 160];
        let value = pcm_loudness(&frame, 2.5);
        assert!((value - 0.25).abs() < 1e-3, "got {value}");
    }

    #[test]
    fn metering_converts_db_to_linear() {
        // -20 dBFS is 0.1 linear.
        let value = metering_loudness(Some(-20.0), 2.5);
        assert!((value - 0.25).abs() < 1e-4, "got {value}");
        assert_eq!(metering_loudness(Some(0.0), 2.5), 1.0);
    }

    #[test]
    fn decodes_little_endian_pairs() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0x7f];
        assert_eq!(pcm_from_le_bytes(&bytes), vec![1, -1, i16::MIN]);
    }

    #[test]
    fn pcm_source_reports_frames_then_close() {
        let (tx, rx) = bounded(4);
        let mut source = PcmBufferSource::new(rx, LoudnessSampler::default());
        tx.send(vec![0i16; 32]).unwrap();
        match source.next_event(Duration::from_millis(10)) {
            SourceEvent::Sample { loudness, pcm } => {
                assert_eq!(loudness, 0.0);
                assert_eq!(pcm.map(|p| p.len()), Some(32));
            }
            other => panic!("expected sample, got {other:?}"),
        }
        assert_eq!(source.next_event(Duration::from_millis(1)), SourceEvent::Idle);
        drop(tx);
        assert_eq!(source.next_event(Duration::from_millis(1)), SourceEvent::Closed);
    }

    #[test]
    fn metering_source_has_no_pcm() {
        let (tx, mut source) = MeteringSource::channel(4, LoudnessSampler::default());
        tx.send(Some(-20.0)).unwrap();
        tx.send(None).unwrap();
        match source.next_event(Duration::from_millis(10)) {
            SourceEvent::Sample { loudness, pcm } => {
                assert!(loudness > 0.2);
                assert!(pcm.is_none());
            }
            other => panic!("expected sample, got {other:?}"),
        }
        assert_eq!(
            source.next_event(Duration::from_millis(10)),
            SourceEvent::Sample {
                loudness: 0.0,
                pcm: None
            }
        );
        assert_eq!(source.name(), "metering");
    }
}
