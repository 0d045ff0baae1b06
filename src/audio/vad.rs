use crate::config::{
    AppConfig, DEFAULT_VAD_DOWN_THRESHOLD, DEFAULT_VAD_MIN_SILENCE_MS, DEFAULT_VAD_MIN_SPEECH_MS,
    DEFAULT_VAD_UP_THRESHOLD,
};

/// Thresholds and dwell times for the hysteresis detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    pub up_threshold: f32,
    pub down_threshold: f32,
    pub min_speech_ms: u64,
    pub min_silence_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            up_threshold: DEFAULT_VAD_UP_THRESHOLD,
            down_threshold: DEFAULT_VAD_DOWN_THRESHOLD,
            min_speech_ms: DEFAULT_VAD_MIN_SPEECH_MS,
            min_silence_ms: DEFAULT_VAD_MIN_SILENCE_MS,
        }
    }
}

impl From<&AppConfig> for VadConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            up_threshold: cfg.vad_up_threshold,
            down_threshold: cfg.vad_down_threshold,
            min_speech_ms: cfg.vad_min_speech_ms,
            min_silence_ms: cfg.vad_min_silence_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VadState {
    #[default]
    Silent,
    Speaking,
}

impl VadState {
    pub fn label(self) -> &'static str {
        match self {
            VadState::Silent => "silent",
            VadState::Speaking => "speaking",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    SpeechStarted,
    /// Speaking gave way to sustained silence; the recognizer session should finalize.
    SpeechEnded,
}

impl VadTransition {
    pub fn label(self) -> &'static str {
        match self {
            VadTransition::SpeechStarted => "speech_started",
            VadTransition::SpeechEnded => "speech_ended",
        }
    }
}

/// Two-threshold voice activity detector driven by smoothed loudness.
///
/// Timestamps are caller-supplied milliseconds and must be non-decreasing.
/// `update` never allocates, so it is safe to call on every sample tick.
#[derive(Debug, Clone)]
pub struct HysteresisVad {
    cfg: VadConfig,
    state: VadState,
    /// Start of the current run at or above `up_threshold` while Silent.
    above_since: Option<u64>,
    /// Last instant at or above `down_threshold` while Speaking.
    last_speech_at: u64,
    last_transition_at: Option<u64>,
}

impl HysteresisVad {
    pub fn new(cfg: VadConfig) -> Self {
        Self {
            cfg,
            state: VadState::Silent,
            above_since: None,
            last_speech_at: 0,
            last_transition_at: None,
        }
    }

    pub fn config(&self) -> &VadConfig {
        &self.cfg
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    pub fn last_transition_at(&self) -> Option<u64> {
        self.last_transition_at
    }

    /// Feed one smoothed loudness value observed at `now_ms`.
    pub fn update(&mut self, level: f32, now_ms: u64) -> Option<VadTransition> {
        let level = if level.is_finite() { level } else { 0.0 };
        match self.state {
            VadState::Silent => {
                if level < self.cfg.up_threshold {
                    self.above_since = None;
                    return None;
                }
                let since = *self.above_since.get_or_insert(now_ms);
                if now_ms.saturating_sub(since) >= self.cfg.min_speech_ms {
                    self.state = VadState::Speaking;
                    self.above_since = None;
                    self.last_speech_at = now_ms;
                    self.last_transition_at = Some(now_ms);
                    return Some(VadTransition::SpeechStarted);
                }
                None
            }
            VadState::Speaking => {
                if level >= self.cfg.down_threshold {
                    self.last_speech_at = now_ms;
                    return None;
                }
                if now_ms.saturating_sub(self.last_speech_at) >= self.cfg.min_silence_ms {
                    self.state = VadState::Silent;
                    self.last_transition_at = Some(now_ms);
                    return Some(VadTransition::SpeechEnded);
                }
                None
            }
        }
    }

    /// Return to the initial Silent state with no pending dwell.
    pub fn reset(&mut self) {
        self.state = VadState::Silent;
        self.above_since = None;
        self.last_speech_at = 0;
        self.last_transition_at = None;
    }
}

impl Default for HysteresisVad {
    fn default() -> Self {
        Self::new(VadConfig::default())
    }
}
