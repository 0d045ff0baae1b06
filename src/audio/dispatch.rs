use crossbeam_channel::{Sender, TrySendError};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Quantize a normalized [-1, 1] sample to signed 16-bit PCM.
pub(crate) fn quantize(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

/// Downmix interleaved input to mono 16-bit PCM. `convert` maps a device
/// sample into [-1, 1].
pub(crate) fn append_downmixed_i16<T, F>(
    buf: &mut Vec<i16>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(|s| quantize(convert(s))));
        return;
    }

    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            buf.push(quantize(acc / channels as f32));
            acc = 0.0;
            count = 0;
        }
    }
    // Partial trailing frame from a misaligned callback buffer.
    if count > 0 {
        buf.push(quantize(acc / count as f32));
    }
}

/// Cuts the capture callback's variable-sized buffers into fixed frames and
/// hands them to the listener without blocking the audio thread.
pub(crate) struct FrameDispatcher {
    frame_samples: usize,
    pending: Vec<i16>,
    scratch: Vec<i16>,
    sender: Sender<Vec<i16>>,
    dropped: Arc<AtomicUsize>,
}

impl FrameDispatcher {
    pub(crate) fn new(
        frame_samples: usize,
        sender: Sender<Vec<i16>>,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            pending: Vec::with_capacity(frame_samples.max(1) * 2),
            scratch: Vec::new(),
            sender,
            dropped,
        }
    }

    pub(crate) fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        self.scratch.clear();
        append_downmixed_i16(&mut self.scratch, data, channels, convert);
        self.pending.extend_from_slice(&self.scratch);

        while self.pending.len() >= self.frame_samples {
            let frame: Vec<i16> = self.pending.drain(..self.frame_samples).collect();
            if let Err(err) = self.sender.try_send(frame) {
                match err {
                    TrySendError::Full(_) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    TrySendError::Disconnected(_) => {
                        self.pending.clear();
                        break;
                    }
                }
            }
        }
    }
}
