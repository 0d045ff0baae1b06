use super::SmoothingMode;

pub const DEFAULT_FRAME_MS: u64 = 20;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_LOUDNESS_GAIN: f32 = 2.5;
pub const DEFAULT_SMOOTHING: SmoothingMode = SmoothingMode::Ema;
pub const DEFAULT_EMA_ALPHA: f32 = 0.22;
pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;
pub const DEFAULT_ATTACK: f32 = 0.5;
pub const DEFAULT_RELEASE: f32 = 0.08;
pub const DEFAULT_VAD_UP_THRESHOLD: f32 = 0.14;
pub const DEFAULT_VAD_DOWN_THRESHOLD: f32 = 0.09;
pub const DEFAULT_VAD_MIN_SPEECH_MS: u64 = 250;
pub const DEFAULT_VAD_MIN_SILENCE_MS: u64 = 1500;
pub const DEFAULT_RESTART_DELAY_MS: u64 = 350;
pub const DEFAULT_DEAD_SESSION_MS: u64 = 4000;
pub const DEFAULT_WATCHDOG_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MAX_CONSECUTIVE_RESTARTS: u32 = 8;
pub const DEFAULT_SEGMENT_LOOKBACK_MS: u64 = 300;
pub const DEFAULT_SEGMENT_MAX_MS: u64 = 30_000;
pub const DEFAULT_ORB_INTENSITY: f32 = 0.6;
pub const DEFAULT_ORB_RADIUS: f32 = 7.0;
pub const DEFAULT_ORB_DETAIL: u32 = 10;
pub const DEFAULT_NOISE_TIME_FACTOR: f64 = 0.000_01;
pub const DEFAULT_BACKEND_URL: &str = "https://virtual-me-voice-agent.vercel.app";
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_PROFILE_NAME: &str = "default";
pub const DEFAULT_MAX_CACHE_FILES: usize = 8;
pub const DEFAULT_SIMULATE_STEP_MS: u64 = 20;

pub(super) const MAX_ORB_DETAIL: u32 = 32;
pub(super) const MAX_HINTS_CHARS: usize = 280;
pub(super) const MAX_SMOOTHING_WINDOW: usize = 100;
