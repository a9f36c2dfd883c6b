// Audio decoder using Symphonia
// Decodes a WAV file to interleaved f32 samples for the cpal backend

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{BoomboxError, Result};

fn failed(context: &str, e: impl std::fmt::Display) -> BoomboxError {
    BoomboxError::PlaybackFailed(format!("{}: {}", context, e))
}

pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    frames: Option<u64>,
}

impl AudioDecoder {
    /// Probe `path` and set up a decoder for its first audio track
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| failed("Failed to probe file format", e))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| BoomboxError::PlaybackFailed("No audio track found".to_string()))?;

        let params = &track.codec_params;
        let track_id = track.id;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| BoomboxError::PlaybackFailed("Unknown sample rate".to_string()))?;
        let channels = params.channels.map(|c| c.count()).unwrap_or(1);
        let frames = params.n_frames;

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| failed("Failed to create decoder", e))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            frames,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Decode the next packet into interleaved samples.
    /// Returns None at end of stream.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(failed("Failed to read packet", e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!("Decode error (skipping): {}", e);
                    continue;
                }
                Err(e) => return Err(failed("Decode failed", e)),
            };

            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            buffer.copy_interleaved_ref(decoded);
            return Ok(Some(buffer.samples().to_vec()));
        }
    }

    /// Decode the rest of the stream into one interleaved buffer.
    /// `stop` is checked between packets; None means it cut decoding short.
    pub fn decode_until(&mut self, stop: impl Fn() -> bool) -> Result<Option<Vec<f32>>> {
        let capacity = self.frames.unwrap_or(0) as usize * self.channels;
        let mut samples = Vec::with_capacity(capacity);
        while let Some(chunk) = self.decode_next()? {
            if stop() {
                return Ok(None);
            }
            samples.extend_from_slice(&chunk);
        }
        Ok(Some(samples))
    }
}
