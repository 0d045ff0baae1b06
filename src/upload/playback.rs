//! Reply playback. Only one reply plays at a time: every sink stops and
//! releases the previous reply before starting the next.

use super::reply::ReplyAudio;
use crate::error::VoxResult;
use crate::log_debug;

pub trait PlaybackSink {
    /// Stop whatever is playing, then start `reply`.
    fn play(&mut self, reply: &ReplyAudio) -> VoxResult<()>;
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
    fn name(&self) -> &'static str;
}

/// Sink used with `--no-playback` or builds without audio output. Replies
/// are still decoded so bad payloads surface the same way.
#[derive(Debug, Default)]
pub struct NullPlayback {
    played: usize,
    active: bool,
}

impl NullPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> usize {
        self.played
    }
}

impl PlaybackSink for NullPlayback {
    fn play(&mut self, reply: &ReplyAudio) -> VoxResult<()> {
        self.stop();
        reply.probe()?;
        self.played += 1;
        self.active = true;
        log_debug(&format!(
            "playback disabled; reply of {} bytes not played",
            reply.bytes.len()
        ));
        Ok(())
    }

    fn stop(&mut self) {
        self.active = false;
    }

    fn is_playing(&self) -> bool {
        self.active
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(feature = "playback")]
pub use rodio_sink::RodioPlayback;

#[cfg(feature = "playback")]
mod rodio_sink {
    use super::PlaybackSink;
    use crate::error::{VoxError, VoxResult};
    use crate::upload::reply::ReplyAudio;
    use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
    use std::io::Cursor;

    /// Default output device. Not `Send`: keep it on the thread that
    /// created it.
    pub struct RodioPlayback {
        _stream: OutputStream,
        handle: OutputStreamHandle,
        current: Option<Sink>,
    }

    impl RodioPlayback {
        pub fn new() -> VoxResult<Self> {
            let (stream, handle) = OutputStream::try_default()
                .map_err(|err| VoxError::Decode(format!("no audio output: {err}")))?;
            tracing::info!(target: "voxorb::upload", "reply playback ready");
            Ok(Self {
                _stream: stream,
                handle,
                current: None,
            })
        }
    }

    impl PlaybackSink for RodioPlayback {
        fn play(&mut self, reply: &ReplyAudio) -> VoxResult<()> {
            self.stop();
            if reply.is_empty() {
                return Err(VoxError::Decode("empty reply body".to_string()));
            }
            let source = rodio::Decoder::new(Cursor::new(reply.bytes.clone()))
                .map_err(|err| VoxError::Decode(err.to_string()))?;
            let sink = Sink::try_new(&self.handle)
                .map_err(|err| VoxError::Decode(err.to_string()))?;
            sink.append(source.convert_samples::<f32>());
            sink.play();
            self.current = Some(sink);
            Ok(())
        }

        fn stop(&mut self) {
            if let Some(sink) = self.current.take() {
                sink.stop();
                drop(sink);
                tracing::debug!(target: "voxorb::upload", "previous reply stopped");
            }
        }

        fn is_playing(&self) -> bool {
            self.current.as_ref().is_some_and(|sink| !sink.empty())
        }

        fn name(&self) -> &'static str {
            "rodio"
        }
    }

    impl Drop for RodioPlayback {
        fn drop(&mut self) {
            self.stop();
        }
    }
}

/// Open the default output device, or fall back to [`NullPlayback`] when
/// playback is disabled or unavailable.
pub fn open_playback(enabled: bool) -> Box<dyn PlaybackSink> {
    if !enabled {
        return Box::new(NullPlayback::new());
    }
    #[cfg(feature = "playback")]
    {
        match RodioPlayback::new() {
            Ok(sink) => return Box::new(sink),
            Err(err) => log_debug(&format!("reply playback unavailable: {err}")),
        }
    }
    Box::new(NullPlayback::new())
}
