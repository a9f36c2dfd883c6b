// Portable device backend
// Decodes WAV with Symphonia and streams it to the default cpal output

use super::decoder::AudioDecoder;
use super::output::{output_available, AudioOutput};
use super::resample::{remix, resample};
use super::task::{Job, PlaybackTask, StopSignal};
use super::{Backend, BackendKind};
use crate::error::{BoomboxError, Result};
use crate::options::{PlayOption, PlayOptions};
use crate::request::PlaybackRequest;

// ~50ms of stereo audio at 48kHz per push
const CHUNK_SAMPLES: usize = 4800;

/// Decoded source audio, interleaved
struct Pcm {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

pub struct CpalBackend {
    task: Option<PlaybackTask>,
}

impl CpalBackend {
    /// Fails when the host has no output device
    pub fn new() -> Result<Self> {
        if !output_available() {
            return Err(BoomboxError::BackendUnavailable(
                "No output device available".to_string(),
            ));
        }
        Ok(Self { task: None })
    }
}

impl Backend for CpalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpal
    }

    fn supports(&self, option: PlayOption) -> bool {
        !matches!(option, PlayOption::BinaryPath)
    }

    fn check(&self, request: &PlaybackRequest) -> Result<()> {
        request.require_wav("cpal")
    }

    fn prepare(&self, request: &PlaybackRequest, options: &PlayOptions) -> Result<Job> {
        let request = request.clone();
        let volume = options.volume;

        // The cpal stream is not Send, so everything device-side happens
        // on the worker thread
        Ok(Box::new(move |signal: &StopSignal| -> Result<()> {
            let Some(pcm) = load(&request, signal)? else {
                return Ok(());
            };
            if pcm.samples.is_empty() || signal.is_raised() {
                return Ok(());
            }

            let output = AudioOutput::open(pcm.sample_rate)?;
            if let Some(volume) = volume {
                output.set_volume(volume);
            }

            let out_channels = output.channels() as usize;
            let samples = remix(&pcm.samples, pcm.channels, out_channels);
            let samples = resample(&samples, out_channels, pcm.sample_rate, output.sample_rate())?;

            let chunk = CHUNK_SAMPLES - CHUNK_SAMPLES % out_channels.max(1);
            for piece in samples.chunks(chunk.max(1)) {
                if !output.write_all(piece, signal)? {
                    output.clear();
                    return Ok(());
                }
            }

            if !output.drain(signal)? {
                output.clear();
            }
            Ok(())
        }))
    }

    fn task_slot(&self) -> &Option<PlaybackTask> {
        &self.task
    }

    fn task_slot_mut(&mut self) -> &mut Option<PlaybackTask> {
        &mut self.task
    }
}

/// Decode the request, giving up (None) once the signal is raised
fn load(request: &PlaybackRequest, signal: &StopSignal) -> Result<Option<Pcm>> {
    match request {
        PlaybackRequest::File(path) => {
            let mut decoder = AudioDecoder::open(path)?;
            let sample_rate = decoder.sample_rate();
            let channels = decoder.channels();
            let Some(samples) = decoder.decode_until(|| signal.is_raised())? else {
                tracing::debug!("stopped while decoding {:?}", path);
                return Ok(None);
            };
            tracing::debug!(
                "decoded {:?}: {} Hz, {} channels, {} samples",
                path,
                sample_rate,
                channels,
                samples.len()
            );
            Ok(Some(Pcm {
                samples,
                sample_rate,
                channels,
            }))
        }
        PlaybackRequest::Tone(buffer) => Ok(Some(Pcm {
            samples: buffer.samples().to_vec(),
            sample_rate: buffer.sample_rate(),
            channels: buffer.channels() as usize,
        })),
        PlaybackRequest::Alias(_) => Err(request.unsupported_alias("cpal")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone::synthesize;
    use std::io::Write;

    #[test]
    fn test_supports() {
        // Capability answers don't need a device
        let backend = CpalBackend { task: None };
        assert!(backend.supports(PlayOption::Wait));
        assert!(backend.supports(PlayOption::TimeoutMs));
        assert!(backend.supports(PlayOption::DurationMs));
        assert!(backend.supports(PlayOption::Volume));
        assert!(!backend.supports(PlayOption::BinaryPath));
    }

    #[test]
    fn test_non_wav_rejected_before_device() {
        let mut file = tempfile::Builder::new().suffix(".ogg").tempfile().unwrap();
        file.write_all(b"OggS\x00\x02\x00\x00\x00\x00\x00\x00").unwrap();
        let request = PlaybackRequest::file(file.path()).unwrap();

        let mut backend = CpalBackend { task: None };
        let err = backend.launch(&request, &PlayOptions::default()).err().unwrap();
        assert!(err.is_unsupported_format());
        assert!(backend.playback().is_none());
    }

    #[test]
    fn test_load_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = synthesize(440.0, 100, 0.5);
        tone.write_wav(&path).unwrap();

        let request = PlaybackRequest::file(&path).unwrap();
        let pcm = load(&request, &StopSignal::default()).unwrap().unwrap();
        assert_eq!(pcm.sample_rate, tone.sample_rate());
        assert_eq!(pcm.channels, 1);
        assert_eq!(pcm.samples.len(), tone.len());
        // 16-bit quantization
        for (a, b) in pcm.samples.iter().zip(tone.samples()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_load_rejects_alias() {
        let err = load(&PlaybackRequest::alias("SystemHand"), &StopSignal::default())
            .err()
            .unwrap();
        assert!(err.is_unsupported_format());
    }

    #[test]
    fn test_load_gives_up_when_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        synthesize(440.0, 2_000, 0.5).write_wav(&path).unwrap();

        let request = PlaybackRequest::file(&path).unwrap();
        assert!(load(&request, &StopSignal::raised()).unwrap().is_none());
    }
}
