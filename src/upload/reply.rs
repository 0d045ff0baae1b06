//! Reply audio returned by the voice endpoint.

use super::cache::AudioCache;
use crate::audio::decode_wav_bytes;
use crate::error::{VoxError, VoxResult};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    Wav,
    Mp3,
}

impl ReplyFormat {
    /// Pick the format from `content-type`, falling back to sniffing the
    /// body. Unknown payloads are treated as WAV.
    pub fn detect(content_type: Option<&str>, bytes: &[u8]) -> Self {
        if let Some(format) = content_type.and_then(Self::from_content_type) {
            return format;
        }
        if bytes.starts_with(b"RIFF") {
            ReplyFormat::Wav
        } else if bytes.starts_with(b"ID3") || bytes.starts_with(&[0xFF, 0xFB]) {
            ReplyFormat::Mp3
        } else {
            ReplyFormat::Wav
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some(ReplyFormat::Wav),
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" => Some(ReplyFormat::Mp3),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReplyFormat::Wav => "wav",
            ReplyFormat::Mp3 => "mp3",
        }
    }
}

/// Out-of-band reply fields carried in the response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyMetadata {
    pub reply_text: Option<String>,
    pub transcript: Option<String>,
    pub language: Option<String>,
    pub voice_id: Option<String>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyAudio {
    pub bytes: Vec<u8>,
    pub format: ReplyFormat,
    pub metadata: ReplyMetadata,
}

impl ReplyAudio {
    pub fn new(bytes: Vec<u8>, content_type: Option<&str>, metadata: ReplyMetadata) -> Self {
        let format = ReplyFormat::detect(content_type, &bytes);
        Self {
            bytes,
            format,
            metadata,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check the buffer decodes before it reaches a sink.
    pub fn probe(&self) -> VoxResult<()> {
        if self.bytes.is_empty() {
            return Err(VoxError::Decode("empty reply body".to_string()));
        }
        match self.format {
            ReplyFormat::Wav => decode_wav_bytes(&self.bytes).map(|_| ()),
            ReplyFormat::Mp3 => probe_compressed(&self.bytes),
        }
    }

    /// Length in milliseconds for WAV replies.
    pub fn duration_ms(&self) -> Option<u64> {
        if self.format != ReplyFormat::Wav {
            return None;
        }
        let (samples, rate) = decode_wav_bytes(&self.bytes).ok()?;
        if rate == 0 {
            return None;
        }
        Some(samples.len() as u64 * 1000 / u64::from(rate))
    }

    /// Write the reply into the cache area.
    pub fn save(&self, cache: &AudioCache) -> VoxResult<PathBuf> {
        cache.store_reply(&self.bytes, self.format.extension())
    }
}

#[cfg(feature = "playback")]
fn probe_compressed(bytes: &[u8]) -> VoxResult<()> {
    rodio::Decoder::new(std::io::Cursor::new(bytes.to_vec()))
        .map(|_| ())
        .map_err(|err| VoxError::Decode(err.to_string()))
}

#[cfg(not(feature = "playback"))]
fn probe_compressed(_bytes: &[u8]) -> VoxResult<()> {
    Ok(())
}
