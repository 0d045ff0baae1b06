//! Error taxonomy for capture, recognition, upload, and playback.
//!
//! Permission and file errors end the current action, recognizer errors are
//! recovered by the session supervisor, and network errors are surfaced but
//! never retried automatically.

use thiserror::Error;

/// Longest slice of a server error body kept for captions and logs.
pub const SERVER_BODY_PREVIEW_CHARS: usize = 160;

pub type VoxResult<T> = Result<T, VoxError>;

#[derive(Error, Debug)]
pub enum VoxError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("audio capture error: {0}")]
    Capture(String),

    #[error("speech recognizer error: {0}")]
    Recognizer(String),

    #[error("recorded file missing: {0}")]
    FileMissing(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("reply audio could not be decoded: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl VoxError {
    /// Build a server error, keeping only a short preview of the body.
    pub fn server(status: u16, body: &str) -> Self {
        VoxError::Server {
            status,
            body: truncate_body(body, SERVER_BODY_PREVIEW_CHARS),
        }
    }

    /// Recognizer hiccups are absorbed by restarts; everything else ends the action.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VoxError::Recognizer(_))
    }

    /// Stable label for structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            VoxError::PermissionDenied(_) => "permission_denied",
            VoxError::Capture(_) => "capture",
            VoxError::Recognizer(_) => "recognizer",
            VoxError::FileMissing(_) => "file_missing",
            VoxError::Io(_) => "io",
            VoxError::Server { .. } => "server",
            VoxError::Network(_) => "network",
            VoxError::Decode(_) => "decode",
            VoxError::Config(_) => "config",
        }
    }

    /// User-facing status line for this failure.
    pub fn caption(&self) -> String {
        match self {
            VoxError::PermissionDenied(_) | VoxError::Capture(_) | VoxError::Recognizer(_) => {
                "Mic error".to_string()
            }
            VoxError::FileMissing(_) => "Recorded file missing.".to_string(),
            VoxError::Server { body, .. } => format!("Server error: {body}"),
            VoxError::Io(err) => format!("Upload/Play failed: {err}"),
            VoxError::Network(msg) | VoxError::Decode(msg) | VoxError::Config(msg) => {
                format!("Upload/Play failed: {msg}")
            }
        }
    }
}

impl From<cpal::DevicesError> for VoxError {
    fn from(err: cpal::DevicesError) -> Self {
        VoxError::Capture(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for VoxError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoxError::Capture(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for VoxError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoxError::Capture(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for VoxError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoxError::Capture(err.to_string())
    }
}

impl From<hound::Error> for VoxError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => VoxError::Io(io),
            other => VoxError::Decode(other.to_string()),
        }
    }
}

/// Cut `body` to at most `max_chars` characters without splitting a code point.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}
