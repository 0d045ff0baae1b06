//! Multipart upload of a recorded clip to the voice endpoint.

use super::context::UploadContext;
use super::reply::{ReplyAudio, ReplyMetadata};
use crate::audio::RecordingClip;
use crate::error::{VoxError, VoxResult};
use crate::log_debug;
use reqwest::blocking::{multipart, Client};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use std::fs;
use std::time::{Duration, Instant};

pub const VOICE_PATH: &str = "/voice";

pub const HEADER_REPLY_TEXT: &str = "x-reply-text";
pub const HEADER_TRANSCRIPT: &str = "x-transcript";
pub const HEADER_LANGUAGE: &str = "x-language";
pub const HEADER_VOICE_ID: &str = "x-voice-id";
pub const HEADER_CONVERSATION_ID: &str = "x-conversation-id";

/// Anything that can turn a recorded clip into a reply.
pub trait ClipUploader: Send + Sync {
    fn upload(&self, clip: &RecordingClip, ctx: &UploadContext) -> VoxResult<ReplyAudio>;
}

/// Blocking client for the voice agent endpoint.
#[derive(Debug, Clone)]
pub struct VoiceClient {
    http: Client,
    endpoint: String,
}

impl VoiceClient {
    pub fn new(backend_url: &str, timeout: Duration) -> VoxResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| VoxError::Network(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: voice_endpoint(backend_url),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post the clip with its context and return the reply audio.
    pub fn send_clip(&self, clip: &RecordingClip, ctx: &UploadContext) -> VoxResult<ReplyAudio> {
        let wav = match fs::read(&clip.path) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return Err(VoxError::FileMissing(clip.path.display().to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(VoxError::FileMissing(clip.path.display().to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        let audio_len = wav.len();

        let part = multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|err| VoxError::Network(err.to_string()))?;
        let form = build_form(part, ctx);

        let mut request = self.http.post(&self.endpoint).multipart(form);
        if let Some(token) = ctx.auth_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let started = Instant::now();
        let res = request
            .send()
            .map_err(|err| VoxError::Network(err.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            tracing::warn!(
                target: "voxorb::upload",
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "voice upload rejected"
            );
            return Err(VoxError::server(status.as_u16(), &body));
        }

        let metadata = parse_reply_headers(res.headers());
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = res
            .bytes()
            .map_err(|err| VoxError::Network(err.to_string()))?
            .to_vec();
        let reply = ReplyAudio::new(bytes, content_type.as_deref(), metadata);

        log_debug(&format!(
            "upload ok: sent {audio_len} bytes, received {} bytes ({})",
            reply.bytes.len(),
            reply.format.extension()
        ));
        tracing::info!(
            target: "voxorb::upload",
            sent_bytes = audio_len,
            reply_bytes = reply.bytes.len(),
            format = reply.format.extension(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "voice upload completed"
        );
        Ok(reply)
    }
}

impl ClipUploader for VoiceClient {
    fn upload(&self, clip: &RecordingClip, ctx: &UploadContext) -> VoxResult<ReplyAudio> {
        self.send_clip(clip, ctx)
    }
}

fn build_form(audio: multipart::Part, ctx: &UploadContext) -> multipart::Form {
    let mut form = multipart::Form::new()
        .part("audio", audio)
        .text("conversationId", ctx.conversation_id.clone())
        .text("profileName", ctx.profile_name.clone())
        .text("preferredName", ctx.preferred_name.clone());
    let optional = [
        ("targetUserId", &ctx.target_user_id),
        ("voiceId", &ctx.voice_id),
        ("hints", &ctx.hints),
    ];
    for (name, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            form = form.text(name, value.to_string());
        }
    }
    form
}

/// `<base>/voice`, tolerating a trailing slash on the base URL.
pub fn voice_endpoint(backend_url: &str) -> String {
    format!("{}{VOICE_PATH}", backend_url.trim_end_matches('/'))
}

/// Read the reply metadata headers. Text headers are URL-encoded.
pub fn parse_reply_headers(headers: &HeaderMap) -> ReplyMetadata {
    let raw = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let decoded = |name: &str| raw(name).map(|v| decode_header_text(&v));
    ReplyMetadata {
        reply_text: decoded(HEADER_REPLY_TEXT),
        transcript: decoded(HEADER_TRANSCRIPT),
        language: raw(HEADER_LANGUAGE),
        voice_id: raw(HEADER_VOICE_ID),
        conversation_id: raw(HEADER_CONVERSATION_ID),
    }
}

/// Percent-decode a header value; malformed input is returned as sent.
pub fn decode_header_text(value: &str) -> String {
    match urlencoding::decode(value) {
        Ok(text) => text.into_owned(),
        Err(_) => value.to_string(),
    }
}
