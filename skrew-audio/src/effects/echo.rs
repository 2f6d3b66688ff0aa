//! Whole-buffer echo: decayed copies summed at integer-sample delays

use super::EffectError;
use crate::buffer::peak;

/// Longest echo tail accepted, in seconds
const MAX_TAIL_SECS: usize = 600;
/// Most delayed copies accepted
pub const MAX_ECHOES: usize = 1000;
/// Copies quieter than this are not summed
const MIN_GAIN: f64 = 1e-6;

/// Sum `count` copies of `input`, the i-th delayed by `i * delay` samples and
/// scaled by `decay^i`
///
/// The output grows by `floor(sample_rate * delay_secs) * count` samples and
/// is scaled down only when its peak exceeds 1.0; quieter results keep their
/// level instead of being normalised to full scale.
pub fn echo(
    input: &[f32],
    sample_rate: u32,
    delay_secs: f64,
    count: usize,
    decay: f64,
) -> Result<Vec<f32>, EffectError> {
    if count > MAX_ECHOES {
        return Err(EffectError::TooLong);
    }
    let delay = (sample_rate as f64 * delay_secs.max(0.0)).floor() as usize;
    let tail = delay.checked_mul(count).ok_or(EffectError::TooLong)?;
    if tail > MAX_TAIL_SECS * sample_rate as usize {
        return Err(EffectError::TooLong);
    }

    let mut out = vec![0.0f32; input.len() + tail];
    out[..input.len()].copy_from_slice(input);

    let mut gain = 1.0f64;
    for i in 1..=count {
        gain *= decay;
        if gain.abs() < MIN_GAIN {
            break;
        }
        let offset = delay * i;
        let g = gain as f32;
        for (dst, &src) in out[offset..offset + input.len()].iter_mut().zip(input) {
            *dst += src * g;
        }
    }

    let max = peak(&out);
    if max > 1.0 {
        out.iter_mut().for_each(|s| *s /= max);
    }
    Ok(out)
}
