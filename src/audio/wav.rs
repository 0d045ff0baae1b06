//! Mono 16-bit WAV clips on disk.

use crate::error::{VoxError, VoxResult};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

fn mono_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// A finalized recording waiting to be uploaded. Consumed by value so a clip
/// is uploaded at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingClip {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub samples: usize,
}

impl RecordingClip {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples as u64 * 1000) / u64::from(self.sample_rate)
    }

    /// Remove the backing file once the clip is no longer needed.
    pub fn discard(self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::debug!(
                target: "voxorb::audio",
                path = %self.path.display(),
                "clip cleanup failed: {err}"
            );
        }
    }
}

/// Streams frames into a WAV file while a recording is running.
pub struct ClipWriter {
    path: PathBuf,
    sample_rate: u32,
    samples: usize,
    writer: WavWriter<BufWriter<File>>,
}

impl ClipWriter {
    pub fn create(path: impl Into<PathBuf>, sample_rate: u32) -> VoxResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = WavWriter::create(&path, mono_spec(sample_rate))?;
        Ok(Self {
            path,
            sample_rate,
            samples: 0,
            writer,
        })
    }

    pub fn write_frame(&mut self, frame: &[i16]) -> VoxResult<()> {
        for &sample in frame {
            self.writer.write_sample(sample)?;
        }
        self.samples += frame.len();
        Ok(())
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Flush the header and hand back the clip. A clip with no audio is
    /// deleted and reported as missing.
    pub fn finish(self) -> VoxResult<RecordingClip> {
        let Self {
            path,
            sample_rate,
            samples,
            writer,
        } = self;
        writer.finalize()?;
        if samples == 0 {
            let _ = fs::remove_file(&path);
            return Err(VoxError::FileMissing(path.display().to_string()));
        }
        if !path.is_file() {
            return Err(VoxError::FileMissing(path.display().to_string()));
        }
        Ok(RecordingClip {
            path,
            sample_rate,
            samples,
        })
    }
}

/// Write a whole buffer as a clip in one go.
pub fn write_clip(
    path: impl Into<PathBuf>,
    samples: &[i16],
    sample_rate: u32,
) -> VoxResult<RecordingClip> {
    let mut writer = ClipWriter::create(path, sample_rate)?;
    writer.write_frame(samples)?;
    writer.finish()
}

/// Read a 16-bit WAV, downmixing to mono. Returns samples and sample rate.
pub fn read_wav_i16(path: &Path) -> VoxResult<(Vec<i16>, u32)> {
    let reader = WavReader::open(path)?;
    decode_reader(reader)
}

/// Decode WAV bytes already in memory (reply bodies).
pub fn decode_wav_bytes(bytes: &[u8]) -> VoxResult<(Vec<i16>, u32)> {
    let reader = WavReader::new(std::io::Cursor::new(bytes))?;
    decode_reader(reader)
}

fn decode_reader<R: std::io::Read>(reader: WavReader<R>) -> VoxResult<(Vec<i16>, u32)> {
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));
    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits) if bits <= 32 => {
            let shift = u32::from(bits.saturating_sub(16));
            reader
                .into_samples::<i32>()
                .map(|s| {
                    s.map(|v| {
                        if bits > 16 {
                            (v >> shift) as i16
                        } else {
                            (v << (16 - bits)) as i16
                        }
                    })
                })
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .map(|s| s.map(super::dispatch::quantize))
            .collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(VoxError::Decode(format!(
                "unsupported wav format {format:?} {bits}-bit"
            )))
        }
    };
    if channels == 1 {
        return Ok((interleaved, spec.sample_rate));
    }
    let mono = interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect();
    Ok((mono, spec.sample_rate))
}
