// Tone synthesis
// Generates sine-wave buffers in memory for beep or ring-like sounds

use std::f64::consts::TAU;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use crate::error::{BoomboxError, Result};
use crate::audio::{select_backend, Backend};
use crate::handle::Handle;
use crate::options::PlayOptions;
use crate::request::PlaybackRequest;

/// Sample rate used by [`synthesize`]
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

/// Longest tone that will be synthesized (one hour)
pub const MAX_DURATION_MS: i64 = 60 * 60 * 1000;

/// A mono waveform ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct ToneBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl ToneBuffer {
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        1
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Encode as a 16-bit PCM WAV image
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, self.wav_spec())
                .map_err(encode_error)?;
            self.write_samples(&mut writer)?;
            writer.finalize().map_err(encode_error)?;
        }
        Ok(cursor.into_inner())
    }

    /// Write as a 16-bit PCM WAV file
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let mut writer = hound::WavWriter::create(path, self.wav_spec()).map_err(encode_error)?;
        self.write_samples(&mut writer)?;
        writer.finalize().map_err(encode_error)
    }

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels(),
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    fn write_samples<W>(&self, writer: &mut hound::WavWriter<W>) -> Result<()>
    where
        W: std::io::Write + std::io::Seek,
    {
        for &sample in &self.samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value).map_err(encode_error)?;
        }
        Ok(())
    }
}

fn encode_error(e: hound::Error) -> BoomboxError {
    BoomboxError::PlaybackFailed(format!("Failed to encode tone: {}", e))
}

/// Generate a sine tone at [`DEFAULT_SAMPLE_RATE`].
///
/// `volume` is clamped to 0..=1 and a non-positive `duration_ms` yields an
/// empty buffer. Same inputs, same buffer.
pub fn synthesize(frequency_hz: f32, duration_ms: i64, volume: f32) -> ToneBuffer {
    synthesize_at(frequency_hz, duration_ms, volume, DEFAULT_SAMPLE_RATE)
}

/// Generate a sine tone at an explicit sample rate.
///
/// The sample rate should be at least double the frequency to represent it.
pub fn synthesize_at(
    frequency_hz: f32,
    duration_ms: i64,
    volume: f32,
    sample_rate: u32,
) -> ToneBuffer {
    let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };

    if duration_ms <= 0 || sample_rate == 0 {
        return ToneBuffer::from_samples(Vec::new(), sample_rate);
    }

    if (sample_rate as f32) < frequency_hz * 2.0 {
        tracing::warn!(
            "sample_rate must be at least double the frequency to represent it: {} < {} ({} Hz * 2)",
            sample_rate,
            frequency_hz * 2.0,
            frequency_hz
        );
    }

    let duration_ms = if duration_ms > MAX_DURATION_MS {
        tracing::warn!(
            "tone of {} ms is too long, capping at {} ms",
            duration_ms,
            MAX_DURATION_MS
        );
        MAX_DURATION_MS
    } else {
        duration_ms
    };

    let num_samples = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
    tracing::debug!(
        "generating {} Hz for {} ms ({} samples)",
        frequency_hz,
        duration_ms,
        num_samples
    );

    let step = TAU * frequency_hz as f64 / sample_rate as f64;
    let samples = (0..num_samples)
        .map(|i| (volume as f64 * (step * i as f64).sin()) as f32)
        .collect();

    ToneBuffer::from_samples(samples, sample_rate)
}

/// Build a handle that plays a synthesized tone on the default backend
pub fn make_tone(
    frequency_hz: f32,
    duration_ms: i64,
    volume: f32,
    options: PlayOptions,
) -> Result<Handle> {
    let backend = select_backend(&options)?;
    make_tone_with(backend, frequency_hz, duration_ms, volume, options)
}

/// [`make_tone`] on a specific backend
pub fn make_tone_with(
    backend: Box<dyn Backend>,
    frequency_hz: f32,
    duration_ms: i64,
    volume: f32,
    options: PlayOptions,
) -> Result<Handle> {
    let buffer = synthesize(frequency_hz, duration_ms, volume);
    Handle::with_backend(PlaybackRequest::Tone(buffer), backend, options)
}
