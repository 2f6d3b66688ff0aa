//! Band-limited sample rate conversion (rubato)

use crate::dsp::DspError;
use rubato::{FftFixedInOut, Resampler};

/// Input chunk size handed to rubato
const CHUNK_SIZE: usize = 1024;

/// Resample mono `samples` from `source_rate` to `target_rate`
///
/// Output length is `len * target_rate / source_rate`, with the resampler's
/// group delay removed.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>, DspError> {
    if source_rate == 0 || target_rate == 0 {
        return Err(DspError::InvalidRate {
            source_rate,
            target_rate,
        });
    }
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedInOut::<f32>::new(source_rate as usize, target_rate as usize, CHUNK_SIZE, 1)
            .map_err(|e| DspError::Resample(e.to_string()))?;

    let expected = (samples.len() as u64 * target_rate as u64 / source_rate as u64) as usize;
    let delay = resampler.output_delay();
    let wanted = expected + delay;

    let mut output: Vec<f32> = Vec::with_capacity(wanted);
    let mut chunk: Vec<f32> = Vec::new();
    let mut pos = 0;

    // Keep feeding (zero-padded past the end) until the delayed tail is out
    while output.len() < wanted {
        let chunk_size = resampler.input_frames_next();
        chunk.clear();
        if pos < samples.len() {
            let end = (pos + chunk_size).min(samples.len());
            chunk.extend_from_slice(&samples[pos..end]);
        }
        chunk.resize(chunk_size, 0.0);
        pos += chunk_size;

        let resampled = resampler
            .process(&[chunk.as_slice()], None)
            .map_err(|e| DspError::Resample(e.to_string()))?;
        match resampled.into_iter().next() {
            Some(data) if !data.is_empty() => output.extend(data),
            _ => break,
        }
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    Ok(output)
}

/// Pad with zeros or truncate to exactly `len`
pub fn fit_length(mut samples: Vec<f32>, len: usize) -> Vec<f32> {
    samples.resize(len, 0.0);
    samples
}
