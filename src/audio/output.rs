// Audio output using cpal
// Feeds the default output device through a ring buffer

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig, SupportedStreamConfig};
use parking_lot::Mutex;
use ringbuf::{HeapRb, traits::{Consumer, Observer, Producer, Split}};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::task::StopSignal;
use crate::error::{BoomboxError, Result};

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

// Time given to the device to play out its last callback buffer
const DRAIN_TAIL: Duration = Duration::from_millis(60);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// True when the default host exposes an output device
pub fn output_available() -> bool {
    cpal::default_host().default_output_device().is_some()
}

pub struct AudioOutput {
    _stream: Stream,
    producer: Arc<Mutex<RingProducer>>,
    sample_rate: u32,
    channels: u16,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    stream_error: Arc<Mutex<Option<String>>>,
}

impl AudioOutput {
    /// Open the default output device, at `preferred_rate` when it is supported
    pub fn open(preferred_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host.default_output_device().ok_or_else(|| {
            BoomboxError::BackendUnavailable("No output device available".to_string())
        })?;

        let config = pick_config(&device, preferred_rate)?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        tracing::debug!(
            "opened output device: {} Hz, {} channels, {:?}",
            sample_rate,
            channels,
            config.sample_format()
        );

        // ~250ms of audio
        let capacity = (sample_rate as usize * channels as usize / 4).max(1024);
        let rb = HeapRb::<f32>::new(capacity);
        let (producer, consumer) = rb.split();
        let producer = Arc::new(Mutex::new(producer));
        let consumer = Arc::new(Mutex::new(consumer));

        let volume = Arc::new(Mutex::new(1.0f32));
        let clear_flag = Arc::new(AtomicBool::new(false));
        let stream_error = Arc::new(Mutex::new(None));

        let shared = Shared {
            consumer,
            volume: volume.clone(),
            clear_flag: clear_flag.clone(),
            stream_error: stream_error.clone(),
        };
        let stream_config: StreamConfig = config.config();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(&device, &stream_config, shared)?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &stream_config, shared)?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(&device, &stream_config, shared)?,
            format => {
                return Err(BoomboxError::PlaybackFailed(format!(
                    "Unsupported sample format: {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| BoomboxError::PlaybackFailed(format!("Failed to start stream: {}", e)))?;

        Ok(Self {
            _stream: stream,
            producer,
            sample_rate,
            channels,
            volume,
            clear_flag,
            stream_error,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        shared: Shared,
    ) -> Result<Stream> {
        let Shared {
            consumer,
            volume,
            clear_flag,
            stream_error,
        } = shared;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut consumer = consumer.lock();
                    let vol = *volume.lock();

                    // If clear flag is set, drain the buffer and output silence
                    if clear_flag.swap(false, Ordering::SeqCst) {
                        while consumer.try_pop().is_some() {}
                    }

                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or(0.0) * vol;
                        *sample = T::from_sample(value);
                    }
                },
                move |err| {
                    tracing::error!("Audio output error: {}", err);
                    stream_error.lock().get_or_insert_with(|| err.to_string());
                },
                None,
            )
            .map_err(|e| {
                BoomboxError::PlaybackFailed(format!("Failed to build output stream: {}", e))
            })?;

        Ok(stream)
    }

    /// Write samples to the output buffer
    /// Returns the number of samples actually written
    pub fn write(&self, samples: &[f32]) -> usize {
        self.producer.lock().push_slice(samples)
    }

    /// Write every sample, waiting for room in the buffer.
    /// Returns false if the signal was raised first.
    pub fn write_all(&self, samples: &[f32], signal: &StopSignal) -> Result<bool> {
        let mut remaining = samples;

        while !remaining.is_empty() {
            self.check_stream()?;
            let written = self.write(remaining);
            if written > 0 {
                remaining = &remaining[written..];
                if signal.is_raised() {
                    return Ok(false);
                }
            } else if signal.sleep(POLL_INTERVAL) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Wait for the buffered samples to reach the device.
    /// Returns false if the signal was raised first.
    pub fn drain(&self, signal: &StopSignal) -> Result<bool> {
        while self.pending() > 0 {
            self.check_stream()?;
            if signal.sleep(POLL_INTERVAL) {
                return Ok(false);
            }
        }
        Ok(!signal.sleep(DRAIN_TAIL))
    }

    /// Samples still queued for the device
    pub fn pending(&self) -> usize {
        self.producer.lock().occupied_len()
    }

    /// Clear the buffer so a stop is silent right away
    pub fn clear(&self) {
        // Set flag so audio callback drains buffer on next call
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    /// Get the output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of output channels
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Set the output volume (0.0 to 1.0)
    pub fn set_volume(&self, vol: f32) {
        *self.volume.lock() = vol.clamp(0.0, 1.0);
    }

    fn check_stream(&self) -> Result<()> {
        match self.stream_error.lock().take() {
            Some(err) => Err(BoomboxError::PlaybackFailed(format!(
                "Audio output error: {}",
                err
            ))),
            None => Ok(()),
        }
    }
}

// State handed to the device callbacks
struct Shared {
    consumer: Arc<Mutex<RingConsumer>>,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    stream_error: Arc<Mutex<Option<String>>>,
}

// Prefer a config matching the device default but running at the source
// rate, so most sources skip resampling
fn pick_config(device: &cpal::Device, preferred_rate: u32) -> Result<SupportedStreamConfig> {
    let default = device.default_output_config().map_err(|e| {
        BoomboxError::BackendUnavailable(format!("Failed to get default output config: {}", e))
    })?;

    if default.sample_rate().0 == preferred_rate {
        return Ok(default);
    }

    let matching = device.supported_output_configs().ok().and_then(|mut configs| {
        configs.find(|range| {
            range.channels() == default.channels()
                && range.sample_format() == default.sample_format()
                && range.min_sample_rate().0 <= preferred_rate
                && preferred_rate <= range.max_sample_rate().0
        })
    });

    Ok(match matching {
        Some(range) => range.with_sample_rate(SampleRate(preferred_rate)),
        None => default,
    })
}
