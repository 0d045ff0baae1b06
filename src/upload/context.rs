//! Per-upload context and the persisted conversation id.
//!
//! The conversation id lives in a small JSON store under the state dir so
//! repeated uploads thread into the same backend conversation. The store is
//! an explicit object owned by the controller; nothing is memoized globally.

use crate::config::{
    AppConfig, DEFAULT_BACKEND_URL, DEFAULT_MAX_CACHE_FILES, DEFAULT_PROFILE_NAME,
    DEFAULT_UPLOAD_TIMEOUT_MS,
};
use crate::error::VoxResult;
use crate::log_debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

pub const CONVERSATION_FILE: &str = "conversation.json";

/// Context fields sent alongside each clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadContext {
    pub conversation_id: String,
    pub profile_name: String,
    pub preferred_name: String,
    pub target_user_id: Option<String>,
    pub voice_id: Option<String>,
    pub hints: Option<String>,
    pub auth_token: Option<String>,
}

impl UploadContext {
    /// The preferred name defaults to the profile name.
    pub fn new(conversation_id: impl Into<String>, profile_name: impl Into<String>) -> Self {
        let profile_name = profile_name.into();
        Self {
            conversation_id: conversation_id.into(),
            preferred_name: profile_name.clone(),
            profile_name,
            target_user_id: None,
            voice_id: None,
            hints: None,
            auth_token: None,
        }
    }

    pub fn with_preferred_name(mut self, name: impl Into<String>) -> Self {
        self.preferred_name = name.into();
        self
    }

    pub fn with_target_user(mut self, user_id: Option<String>) -> Self {
        self.target_user_id = user_id;
        self
    }

    pub fn with_voice(mut self, voice_id: Option<String>) -> Self {
        self.voice_id = voice_id;
        self
    }

    pub fn with_hints(mut self, hints: Option<String>) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }
}

/// Upload-side settings derived from the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    pub backend_url: String,
    pub timeout: Duration,
    pub profile_name: String,
    pub preferred_name: Option<String>,
    pub target_user_id: Option<String>,
    pub voice_id: Option<String>,
    pub hints: Option<String>,
    pub auth_token: Option<String>,
    pub conversation_override: Option<String>,
    pub state_dir: PathBuf,
    pub max_cache_files: usize,
    pub playback: bool,
}

impl UploadSettings {
    pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS),
            profile_name: DEFAULT_PROFILE_NAME.to_string(),
            preferred_name: None,
            target_user_id: None,
            voice_id: None,
            hints: None,
            auth_token: None,
            conversation_override: None,
            state_dir: state_dir.into(),
            max_cache_files: DEFAULT_MAX_CACHE_FILES,
            playback: true,
        }
    }

    /// Build the context for one upload against a known conversation id.
    pub fn context(&self, conversation_id: &str) -> UploadContext {
        let mut ctx = UploadContext::new(conversation_id, self.profile_name.clone())
            .with_target_user(self.target_user_id.clone())
            .with_voice(self.voice_id.clone())
            .with_hints(self.hints.clone())
            .with_auth_token(self.auth_token.clone());
        if let Some(name) = &self.preferred_name {
            ctx = ctx.with_preferred_name(name.clone());
        }
        ctx
    }
}

impl From<&AppConfig> for UploadSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            backend_url: cfg.backend_url.clone(),
            timeout: Duration::from_millis(cfg.upload_timeout_ms),
            profile_name: cfg.profile_name.clone(),
            preferred_name: cfg.preferred_name.clone(),
            target_user_id: cfg.target_user_id.clone(),
            voice_id: cfg.voice_id.clone(),
            hints: cfg.hints.clone(),
            auth_token: cfg.auth_token.clone(),
            conversation_override: cfg.conversation_id.clone(),
            state_dir: cfg.resolved_state_dir(),
            max_cache_files: cfg.max_cache_files,
            playback: !cfg.no_playback,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct StoredConversation {
    conversation_id: String,
}

/// Small key-value file holding the device's conversation id.
#[derive(Debug)]
pub struct ConversationStore {
    path: PathBuf,
    cached: Option<String>,
}

impl ConversationStore {
    pub fn open(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(CONVERSATION_FILE),
            cached: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the explicit override when given, else the persisted id,
    /// generating and saving one on first use.
    pub fn ensure_conversation_id(&mut self, explicit: Option<&str>) -> VoxResult<String> {
        if let Some(id) = explicit.map(str::trim).filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }
        if let Some(id) = &self.cached {
            return Ok(id.clone());
        }
        if let Some(id) = self.load() {
            self.cached = Some(id.clone());
            return Ok(id);
        }
        let id = generate_conversation_id();
        self.save(&id)?;
        log_debug(&format!(
            "created conversation id in {}",
            self.path.display()
        ));
        self.cached = Some(id.clone());
        Ok(id)
    }

    /// Forget the stored id so the next upload starts a new conversation.
    pub fn reset(&mut self) -> VoxResult<()> {
        self.cached = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn load(&self) -> Option<String> {
        let contents = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<StoredConversation>(&contents) {
            Ok(stored) if !stored.conversation_id.trim().is_empty() => {
                Some(stored.conversation_id.trim().to_string())
            }
            Ok(_) => None,
            Err(err) => {
                log_debug(&format!(
                    "ignoring unreadable conversation store {}: {err}",
                    self.path.display()
                ));
                None
            }
        }
    }

    fn save(&self, id: &str) -> VoxResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stored = StoredConversation {
            conversation_id: id.to_string(),
        };
        let contents = serde_json::to_string_pretty(&stored)
            .map_err(|err| crate::error::VoxError::Config(err.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

pub fn generate_conversation_id() -> String {
    Uuid::new_v4().to_string()
}
