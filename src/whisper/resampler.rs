use anyhow::{Result, anyhow};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::media::TARGET_SAMPLE_RATE;

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut out = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, &s) in frame.iter().enumerate() {
            out[ch].push(s);
        }
    }
    out
}

/// Converts interleaved audio to the recognizer's rate. The extractor
/// already asks ffmpeg for 16 kHz, so this only runs for WAVs that
/// arrive some other way.
pub fn resample_to_16khz(samples: &[f32], sample_rate: u32, channels: usize) -> Result<Vec<f32>> {
    if sample_rate == TARGET_SAMPLE_RATE {
        return Ok(samples.to_vec());
    }
    if channels == 0 || sample_rate == 0 {
        return Err(anyhow!("Invalid audio layout: {sample_rate}Hz, {channels} channels"));
    }

    let frames = samples.len() / channels;
    if frames == 0 {
        return Err(anyhow!("No audio frames to resample"));
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = TARGET_SAMPLE_RATE as f64 / sample_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, channels)?;

    let resampled = resampler.process(&deinterleave(samples, channels), None)?;
    let delay = resampler.output_delay();
    let wanted = (frames as f64 * ratio) as usize;
    let available = resampled.first().map_or(0, |c| c.len());
    let end = (delay + wanted).min(available);

    let mut output = Vec::with_capacity(end.saturating_sub(delay) * channels);
    for frame in delay..end {
        for channel in &resampled {
            output.push(channel[frame]);
        }
    }
    Ok(output)
}
