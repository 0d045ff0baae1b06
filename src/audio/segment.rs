//! Cuts hands-free speech segments out of the live frame stream.
//!
//! A short ring of recent frames is kept while Silent so a segment includes
//! the onset that happened before the VAD's dwell time elapsed. Trailing
//! silence beyond the lookback length is trimmed when the segment closes.

use super::vad::VadTransition;
use crate::config::{AppConfig, DEFAULT_SEGMENT_LOOKBACK_MS, DEFAULT_SEGMENT_MAX_MS};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    pub lookback_ms: u64,
    pub max_ms: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            lookback_ms: DEFAULT_SEGMENT_LOOKBACK_MS,
            max_ms: DEFAULT_SEGMENT_MAX_MS,
        }
    }
}

impl From<&AppConfig> for SegmentConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            lookback_ms: cfg.segment_lookback_ms,
            max_ms: cfg.segment_max_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEnd {
    Silence,
    MaxLength,
    Flushed,
}

impl SegmentEnd {
    pub fn label(self) -> &'static str {
        match self {
            SegmentEnd::Silence => "silence",
            SegmentEnd::MaxLength => "max_length",
            SegmentEnd::Flushed => "flushed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmSegment {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub end: SegmentEnd,
}

impl PcmSegment {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }
}

struct ActiveSegment {
    samples: Vec<i16>,
    trailing_quiet: usize,
}

pub struct SegmentRecorder {
    sample_rate: u32,
    lookback: VecDeque<Vec<i16>>,
    lookback_held: usize,
    lookback_limit: usize,
    max_samples: usize,
    active: Option<ActiveSegment>,
}

impl SegmentRecorder {
    pub fn new(cfg: &SegmentConfig, sample_rate: u32) -> Self {
        let per_ms = |ms: u64| (ms * u64::from(sample_rate) / 1000) as usize;
        Self {
            sample_rate,
            lookback: VecDeque::new(),
            lookback_held: 0,
            lookback_limit: per_ms(cfg.lookback_ms),
            max_samples: per_ms(cfg.max_ms).max(1),
            active: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Feed one frame along with whether it counted as voiced and the VAD
    /// transition it produced. Returns a segment when one closes.
    pub fn push(
        &mut self,
        frame: Vec<i16>,
        voiced: bool,
        transition: Option<VadTransition>,
    ) -> Option<PcmSegment> {
        match self.active.as_mut() {
            Some(active) => {
                if voiced {
                    active.trailing_quiet = 0;
                } else {
                    active.trailing_quiet += frame.len();
                }
                active.samples.extend_from_slice(&frame);
                if transition == Some(VadTransition::SpeechEnded) {
                    return self.close(SegmentEnd::Silence);
                }
                if active.samples.len() >= self.max_samples {
                    let segment = self.close(SegmentEnd::MaxLength);
                    // Speech is still running; keep recording into a fresh segment.
                    self.active = Some(ActiveSegment {
                        samples: Vec::new(),
                        trailing_quiet: 0,
                    });
                    return segment;
                }
                None
            }
            None => {
                if transition == Some(VadTransition::SpeechStarted) {
                    let mut samples = Vec::with_capacity(self.lookback_held + frame.len());
                    for held in self.lookback.drain(..) {
                        samples.extend(held);
                    }
                    self.lookback_held = 0;
                    samples.extend(frame);
                    self.active = Some(ActiveSegment {
                        samples,
                        trailing_quiet: 0,
                    });
                } else {
                    self.hold(frame);
                }
                None
            }
        }
    }

    /// Close any open segment, e.g. when listening stops.
    pub fn flush(&mut self) -> Option<PcmSegment> {
        self.close(SegmentEnd::Flushed)
    }

    pub fn reset(&mut self) {
        self.active = None;
        self.lookback.clear();
        self.lookback_held = 0;
    }

    fn hold(&mut self, frame: Vec<i16>) {
        if self.lookback_limit == 0 {
            return;
        }
        self.lookback_held += frame.len();
        self.lookback.push_back(frame);
        while self.lookback_held > self.lookback_limit {
            match self.lookback.pop_front() {
                Some(old) => self.lookback_held -= old.len(),
                None => break,
            }
        }
    }

    fn close(&mut self, end: SegmentEnd) -> Option<PcmSegment> {
        let mut active = self.active.take()?;
        if end == SegmentEnd::Silence {
            let excess = active.trailing_quiet.saturating_sub(self.lookback_limit);
            let keep = active.samples.len().saturating_sub(excess);
            active.samples.truncate(keep);
        }
        if active.samples.is_empty() {
            return None;
        }
        Some(PcmSegment {
            samples: active.samples,
            sample_rate: self.sample_rate,
            end,
        })
    }
}
