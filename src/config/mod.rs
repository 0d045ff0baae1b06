//! Command-line parsing and validation for every tunable in the listening,
//! session, orb, and upload paths.

mod defaults;
mod validation;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub use defaults::{
    DEFAULT_ATTACK, DEFAULT_BACKEND_URL, DEFAULT_CHANNEL_CAPACITY, DEFAULT_DEAD_SESSION_MS,
    DEFAULT_EMA_ALPHA, DEFAULT_FRAME_MS, DEFAULT_LOUDNESS_GAIN, DEFAULT_MAX_CACHE_FILES,
    DEFAULT_MAX_CONSECUTIVE_RESTARTS, DEFAULT_NOISE_TIME_FACTOR, DEFAULT_ORB_DETAIL,
    DEFAULT_ORB_INTENSITY, DEFAULT_ORB_RADIUS, DEFAULT_PROFILE_NAME, DEFAULT_RELEASE,
    DEFAULT_RESTART_DELAY_MS, DEFAULT_SEGMENT_LOOKBACK_MS, DEFAULT_SEGMENT_MAX_MS,
    DEFAULT_SIMULATE_STEP_MS, DEFAULT_SMOOTHING, DEFAULT_SMOOTHING_WINDOW,
    DEFAULT_UPLOAD_TIMEOUT_MS, DEFAULT_VAD_DOWN_THRESHOLD, DEFAULT_VAD_MIN_SILENCE_MS,
    DEFAULT_VAD_MIN_SPEECH_MS, DEFAULT_VAD_UP_THRESHOLD, DEFAULT_WATCHDOG_INTERVAL_MS,
};

/// CLI options for voxorb. `validate()` enforces the cross-field invariants
/// (hysteresis band, timer ordering) before anything starts.
#[derive(Debug, Parser, Clone)]
#[command(about = "VoxOrb voice activity and audio-reactive orb core", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Run the live listening pipeline and print VAD transitions
    #[arg(long = "listen", default_value_t = false)]
    pub listen: bool,

    /// With --listen, upload each hands-free speech segment instead of only saving it
    #[arg(long = "upload-segments", default_value_t = false)]
    pub upload_segments: bool,

    /// Push-to-toggle record, upload, and play loop (Enter toggles)
    #[arg(long = "talk", default_value_t = false)]
    pub talk: bool,

    /// Feed a comma-separated loudness sequence through the VAD and exit
    #[arg(long = "simulate-vad", value_name = "LEVELS")]
    pub simulate_vad: Option<String>,

    /// Virtual time between simulated samples (milliseconds)
    #[arg(long = "simulate-step-ms", default_value_t = DEFAULT_SIMULATE_STEP_MS)]
    pub simulate_step_ms: u64,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "VOXORB_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "VOXORB_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging transcripts and reply captions (debug log only)
    #[arg(long = "log-content", env = "VOXORB_LOG_CONTENT", default_value_t = false)]
    pub log_content: bool,

    /// Capture frame size fed to the loudness sampler (milliseconds)
    #[arg(long = "frame-ms", default_value_t = DEFAULT_FRAME_MS)]
    pub frame_ms: u64,

    /// Frame channel capacity between the capture callback and the listener
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Linear gain applied to RMS before clamping into [0, 1]
    #[arg(long = "loudness-gain", default_value_t = DEFAULT_LOUDNESS_GAIN)]
    pub loudness_gain: f32,

    /// Loudness smoothing strategy
    #[arg(long = "smoothing", value_enum, default_value_t = DEFAULT_SMOOTHING)]
    pub smoothing: SmoothingMode,

    /// EMA blend factor (ema smoothing)
    #[arg(long = "ema-alpha", default_value_t = DEFAULT_EMA_ALPHA)]
    pub ema_alpha: f32,

    /// Moving-average window in samples (window smoothing)
    #[arg(long = "smoothing-window", default_value_t = DEFAULT_SMOOTHING_WINDOW)]
    pub smoothing_window: usize,

    /// Attack coefficient for the orb envelope (rising loudness)
    #[arg(long = "attack", default_value_t = DEFAULT_ATTACK)]
    pub attack: f32,

    /// Release coefficient for the orb envelope (falling loudness)
    #[arg(long = "release", default_value_t = DEFAULT_RELEASE)]
    pub release: f32,

    /// Smoothed loudness that must be held to enter Speaking
    #[arg(long = "vad-up-threshold", default_value_t = DEFAULT_VAD_UP_THRESHOLD)]
    pub vad_up_threshold: f32,

    /// Smoothed loudness below which Speaking starts counting silence
    #[arg(long = "vad-down-threshold", default_value_t = DEFAULT_VAD_DOWN_THRESHOLD)]
    pub vad_down_threshold: f32,

    /// Dwell above the up threshold before Speaking (milliseconds)
    #[arg(long = "vad-min-speech-ms", default_value_t = DEFAULT_VAD_MIN_SPEECH_MS)]
    pub vad_min_speech_ms: u64,

    /// Dwell below the down threshold before Silent (milliseconds)
    #[arg(long = "vad-min-silence-ms", default_value_t = DEFAULT_VAD_MIN_SILENCE_MS)]
    pub vad_min_silence_ms: u64,

    /// Cooldown before a recognizer session is restarted (milliseconds)
    #[arg(long = "restart-delay-ms", default_value_t = DEFAULT_RESTART_DELAY_MS)]
    pub restart_delay_ms: u64,

    /// Result-free window after which a session is presumed stuck (milliseconds)
    #[arg(long = "dead-session-ms", default_value_t = DEFAULT_DEAD_SESSION_MS)]
    pub dead_session_ms: u64,

    /// Watchdog tick period (milliseconds)
    #[arg(long = "watchdog-interval-ms", default_value_t = DEFAULT_WATCHDOG_INTERVAL_MS)]
    pub watchdog_interval_ms: u64,

    /// Forced restarts without any result before giving up (0 = never give up)
    #[arg(
        long = "max-consecutive-restarts",
        default_value_t = DEFAULT_MAX_CONSECUTIVE_RESTARTS
    )]
    pub max_consecutive_restarts: u32,

    /// Audio kept from before speech onset in hands-free segments (milliseconds)
    #[arg(long = "segment-lookback-ms", default_value_t = DEFAULT_SEGMENT_LOOKBACK_MS)]
    pub segment_lookback_ms: u64,

    /// Hard cap on a hands-free segment (milliseconds)
    #[arg(long = "segment-max-ms", default_value_t = DEFAULT_SEGMENT_MAX_MS)]
    pub segment_max_ms: u64,

    /// Orb deformation intensity
    #[arg(long = "orb-intensity", default_value_t = DEFAULT_ORB_INTENSITY)]
    pub orb_intensity: f32,

    /// Orb base radius
    #[arg(long = "orb-radius", default_value_t = DEFAULT_ORB_RADIUS)]
    pub orb_radius: f32,

    /// Icosphere subdivision level for the orb mesh
    #[arg(long = "orb-detail", default_value_t = DEFAULT_ORB_DETAIL)]
    pub orb_detail: u32,

    /// Noise drift per millisecond of animation time
    #[arg(long = "noise-time-factor", default_value_t = DEFAULT_NOISE_TIME_FACTOR)]
    pub noise_time_factor: f64,

    /// Fixed orb noise seed (random per run when omitted)
    #[arg(long = "orb-seed")]
    pub orb_seed: Option<u64>,

    /// Voice agent base URL (the clip is posted to `<url>/voice`)
    #[arg(long = "backend-url", env = "VOXORB_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,

    /// Upload request timeout (milliseconds)
    #[arg(long = "upload-timeout-ms", default_value_t = DEFAULT_UPLOAD_TIMEOUT_MS)]
    pub upload_timeout_ms: u64,

    /// Persona/profile name sent with each clip
    #[arg(long = "profile-name", default_value = DEFAULT_PROFILE_NAME)]
    pub profile_name: String,

    /// Name the agent should address the user by (defaults to the profile name)
    #[arg(long = "preferred-name")]
    pub preferred_name: Option<String>,

    /// Act on behalf of another user
    #[arg(long = "target-user-id")]
    pub target_user_id: Option<String>,

    /// Reply voice override
    #[arg(long = "voice-id")]
    pub voice_id: Option<String>,

    /// Short hint string forwarded to the recognizer backend
    #[arg(long = "hints")]
    pub hints: Option<String>,

    /// Bearer token for the voice endpoint
    #[arg(long = "auth-token", env = "VOXORB_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Explicit conversation id (skips the persisted one)
    #[arg(long = "conversation-id")]
    pub conversation_id: Option<String>,

    /// Directory for the conversation store and audio cache
    #[arg(long = "state-dir", env = "VOXORB_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Maximum number of cached recording/reply files kept on disk
    #[arg(long = "max-cache-files", default_value_t = DEFAULT_MAX_CACHE_FILES)]
    pub max_cache_files: usize,

    /// Skip reply playback (still downloads and caches the reply)
    #[arg(long = "no-playback", default_value_t = false)]
    pub no_playback: bool,
}

/// Available loudness smoothing strategies. One is chosen per pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SmoothingMode {
    Ema,
    Window,
}

impl SmoothingMode {
    pub fn label(self) -> &'static str {
        match self {
            SmoothingMode::Ema => "ema",
            SmoothingMode::Window => "window",
        }
    }
}
