//! Voice activity detection and audio-reactive orb core.
//!
//! Capture feeds a loudness sampler, a smoother, and a hysteresis VAD; the
//! session supervisor keeps a continuous recognizer alive on top of the VAD;
//! the recording controller uploads push-to-toggle clips and plays replies;
//! the orb renderer turns the smoothed level into mesh deformation.

pub mod app;
pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
mod lock;
pub mod orb;
pub mod session;
mod telemetry;
pub mod upload;

pub use app::{
    content_logging_enabled, crash_log_path, init_logging, log_debug, log_debug_content,
    log_file_path, log_panic,
};
pub use error::{VoxError, VoxResult};
