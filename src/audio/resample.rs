// Sample-rate and channel conversion
// Adapts decoded sources to whatever the output device runs at

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::error::{BoomboxError, Result};

/// Convert interleaved samples between channel counts.
///
/// Downmixing to mono averages the frame; anything else maps output
/// channel `c` to input channel `c % from`.
pub fn remix(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let frames = samples.chunks_exact(from);
    let mut out = Vec::with_capacity(frames.len() * to);
    for frame in frames {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|c| frame[c % from]));
        }
    }
    out
}

/// Resample interleaved audio with a windowed-sinc interpolator
pub fn resample(samples: &[f32], channels: usize, from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() || channels == 0 {
        return Ok(samples.to_vec());
    }

    let frames = samples.len() / channels;
    if frames == 0 {
        return Ok(Vec::new());
    }
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &sample) in planar.iter_mut().zip(frame) {
            plane.push(sample);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, channels)
        .map_err(|e| BoomboxError::PlaybackFailed(format!("Failed to create resampler: {}", e)))?;

    let failed =
        |e: rubato::ResampleError| BoomboxError::PlaybackFailed(format!("Resampling failed: {}", e));

    // The filter delays its output; flush with silence until the delayed
    // tail has come out, then cut the delay off the front
    let delay = resampler.output_delay();
    let expected = (frames as f64 * ratio).round() as usize;
    let needed = delay + expected;

    let mut output = resampler.process(&planar, None).map_err(failed)?;
    let mut flushes = 0;
    while output.first().map(Vec::len).unwrap_or(0) < needed && flushes <= needed {
        let tail = resampler.process_partial(None::<&[Vec<f32>]>, None).map_err(failed)?;
        for (plane, more) in output.iter_mut().zip(tail) {
            plane.extend(more);
        }
        flushes += 1;
    }

    let available = output.first().map(Vec::len).unwrap_or(0);
    let out_frames = needed.min(available).saturating_sub(delay);
    let mut interleaved = Vec::with_capacity(out_frames * channels);
    for i in delay..delay + out_frames {
        for plane in &output {
            interleaved.push(plane[i]);
        }
    }

    tracing::debug!(
        "resampled {} Hz -> {} Hz ({} -> {} frames)",
        from_rate,
        to_rate,
        frames,
        out_frames
    );
    Ok(interleaved)
}
