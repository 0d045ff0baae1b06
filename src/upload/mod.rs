//! Clip upload to the voice endpoint, reply decoding, caching, and playback.

mod cache;
mod client;
mod context;
mod playback;
mod reply;

pub use cache::AudioCache;
pub use client::{
    decode_header_text, parse_reply_headers, voice_endpoint, ClipUploader, VoiceClient,
    HEADER_CONVERSATION_ID, HEADER_LANGUAGE, HEADER_REPLY_TEXT, HEADER_TRANSCRIPT, HEADER_VOICE_ID,
    VOICE_PATH,
};
pub use context::{
    generate_conversation_id, ConversationStore, UploadContext, UploadSettings, CONVERSATION_FILE,
};
#[cfg(feature = "playback")]
pub use playback::RodioPlayback;
pub use playback::{open_playback, NullPlayback, PlaybackSink};
pub use reply::{ReplyAudio, ReplyFormat, ReplyMetadata};
