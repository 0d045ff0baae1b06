//! System microphone capture via CPAL.
//!
//! Frames are downmixed to mono 16-bit PCM at the device-native rate and
//! pushed over a bounded channel, so the listener never blocks the audio
//! callback thread.

use super::dispatch::FrameDispatcher;
use crate::error::{VoxError, VoxResult};
use crate::lock::lock_or_recover;
use crate::log_debug;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicPermission {
    Granted,
    Denied,
}

/// Something that can open a microphone capture session.
pub trait CaptureDevice {
    fn name(&self) -> String;

    /// Ask the platform for microphone access. Desktop hosts mediate access
    /// themselves, so the default is to assume it is granted.
    fn request_permission(&mut self) -> MicPermission {
        MicPermission::Granted
    }

    fn open(&mut self, frame_ms: u64, channel_capacity: usize) -> VoxResult<CaptureStream>;
}

/// A running capture. Frames flow until the stream is stopped or dropped.
pub struct CaptureStream {
    frames: Receiver<Vec<i16>>,
    sample_rate: u32,
    device_name: String,
    guard: CaptureGuard,
}

impl CaptureStream {
    /// `keepalive` owns whatever keeps frames flowing (a CPAL stream, a
    /// producer thread handle). Dropping it must end the capture.
    pub fn new(
        frames: Receiver<Vec<i16>>,
        sample_rate: u32,
        device_name: impl Into<String>,
        dropped: Arc<AtomicUsize>,
        keepalive: Box<dyn Any>,
    ) -> Self {
        Self {
            frames,
            sample_rate,
            device_name: device_name.into(),
            guard: CaptureGuard {
                keepalive: Some(keepalive),
                dropped,
            },
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Hand the frame receiver to a consumer and keep the guard with the owner.
    pub fn split(self) -> (Receiver<Vec<i16>>, CaptureGuard) {
        (self.frames, self.guard)
    }
}

/// Keeps the native capture alive; `stop` releases it.
pub struct CaptureGuard {
    keepalive: Option<Box<dyn Any>>,
    dropped: Arc<AtomicUsize>,
}

impl CaptureGuard {
    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Pause a native stream without releasing it. Replay devices ignore this.
    pub fn pause(&self) -> VoxResult<()> {
        match self.native_stream() {
            Some(stream) => stream
                .pause()
                .map_err(|err| VoxError::Capture(format!("failed to pause audio stream: {err}"))),
            None => Ok(()),
        }
    }

    pub fn resume(&self) -> VoxResult<()> {
        match self.native_stream() {
            Some(stream) => stream
                .play()
                .map_err(|err| VoxError::Capture(format!("failed to resume audio stream: {err}"))),
            None => Ok(()),
        }
    }

    fn native_stream(&self) -> Option<&cpal::Stream> {
        self.keepalive.as_ref()?.downcast_ref::<cpal::Stream>()
    }

    /// Release the native stream. Returns frames dropped on a full channel.
    pub fn stop(mut self) -> usize {
        self.release();
        self.dropped_frames()
    }

    fn release(&mut self) {
        if let Some(keepalive) = self.keepalive.take() {
            if let Some(stream) = keepalive.downcast_ref::<cpal::Stream>() {
                if let Err(err) = stream.pause() {
                    log_debug(&format!("failed to pause audio stream: {err}"));
                }
            }
            drop(keepalive);
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Audio input device wrapper.
pub struct Recorder {
    device: cpal::Device,
}

impl Recorder {
    /// List microphone names so the CLI can expose a selector.
    pub fn list_devices() -> VoxResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices()?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Create a recorder, optionally forcing a specific device by name.
    pub fn new(preferred_device: Option<&str>) -> VoxResult<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices()?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| VoxError::Capture(format!("input device '{name}' not found")))?
            }
            None => host.default_input_device().ok_or_else(|| {
                VoxError::Capture(format!(
                    "no default input device available. {}",
                    mic_permission_hint()
                ))
            })?,
        };
        Ok(Self { device })
    }

    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }
}

impl CaptureDevice for Recorder {
    fn name(&self) -> String {
        self.device_name()
    }

    fn open(&mut self, frame_ms: u64, channel_capacity: usize) -> VoxResult<CaptureStream> {
        let default_config = self.device.default_input_config()?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let sample_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));
        let frame_samples =
            ((u64::from(sample_rate) * frame_ms.clamp(5, 120)) / 1000).max(1) as usize;

        log_debug(&format!(
            "Recorder config: format={format:?} rate={sample_rate}Hz channels={channels} \
             frame_samples={frame_samples}"
        ));

        let (sender, receiver) = bounded::<Vec<i16>>(channel_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(Mutex::new(FrameDispatcher::new(
            frame_samples,
            sender,
            dropped.clone(),
        )));

        let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));
        let stream = match format {
            SampleFormat::F32 => {
                let dispatcher = dispatcher.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[f32], _| {
                        lock_or_recover(&dispatcher, "capture_f32").push(data, channels, |s| s);
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let dispatcher = dispatcher.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[i16], _| {
                        lock_or_recover(&dispatcher, "capture_i16")
                            .push(data, channels, |s| f32::from(s) / 32_768.0);
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let dispatcher = dispatcher.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[u16], _| {
                        lock_or_recover(&dispatcher, "capture_u16")
                            .push(data, channels, |s| (f32::from(s) - 32_768.0) / 32_768.0);
                    },
                    err_fn,
                    None,
                )?
            }
            other => {
                return Err(VoxError::Capture(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        };
        // The callbacks now own their dispatcher clones; once the stream is
        // dropped the sender goes with it and the receiver disconnects.
        drop(dispatcher);

        stream.play()?;
        Ok(CaptureStream::new(
            receiver,
            sample_rate,
            self.device_name(),
            dropped,
            Box::new(stream),
        ))
    }
}

pub(crate) fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}

/// Capture device that replays canned frames. Used by tests and the
/// offline simulation paths.
pub struct ScriptedCapture {
    frames: Vec<Vec<i16>>,
    sample_rate: u32,
    permission: MicPermission,
    fail_open: Option<String>,
    opened: usize,
}

impl ScriptedCapture {
    pub fn new(frames: Vec<Vec<i16>>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
            permission: MicPermission::Granted,
            fail_open: None,
            opened: 0,
        }
    }

    pub fn denied() -> Self {
        Self {
            permission: MicPermission::Denied,
            ..Self::new(Vec::new(), 16_000)
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_open: Some(message.to_string()),
            ..Self::new(Vec::new(), 16_000)
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened
    }
}

impl CaptureDevice for ScriptedCapture {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn request_permission(&mut self) -> MicPermission {
        self.permission
    }

    fn open(&mut self, _frame_ms: u64, channel_capacity: usize) -> VoxResult<CaptureStream> {
        if let Some(message) = &self.fail_open {
            return Err(VoxError::Capture(message.clone()));
        }
        self.opened += 1;
        let (sender, receiver) = bounded(channel_capacity.max(self.frames.len()).max(1));
        for frame in &self.frames {
            if sender.try_send(frame.clone()).is_err() {
                break;
            }
        }
        // Holding the sender keeps the channel open until the guard stops.
        Ok(CaptureStream::new(
            receiver,
            self.sample_rate,
            self.name(),
            Arc::new(AtomicUsize::new(0)),
            Box::new(sender),
        ))
    }
}
