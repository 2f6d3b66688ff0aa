//! Duration-changing effects: phase-vocoder stretch, resample stretch, tempo match

use super::EffectError;
use crate::dsp::Dsp;
use crate::resample::fit_length;
use tracing::warn;

/// Smallest rate any duration change accepts
pub const MIN_RATE: f64 = 0.1;
/// Largest rate any duration change accepts
pub const MAX_RATE: f64 = 10.0;
/// Lowest target tempo `bpm_match` accepts
pub const MIN_TARGET_BPM: f64 = 20.0;

/// Clamp a requested rate into [`MIN_RATE`]..=[`MAX_RATE`]; NaN maps to the minimum
pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        MIN_RATE
    } else {
        rate.clamp(MIN_RATE, MAX_RATE)
    }
}

fn stretched_len(len: usize, rate: f64) -> usize {
    (len as f64 / rate).round() as usize
}

pub fn time_stretch(dsp: &dyn Dsp, samples: &[f32], rate: f64) -> Result<Vec<f32>, EffectError> {
    stretch(dsp, samples, clamp_rate(rate))
}

/// `rate` must be positive and finite
fn stretch(dsp: &dyn Dsp, samples: &[f32], rate: f64) -> Result<Vec<f32>, EffectError> {
    let out = dsp.time_stretch(samples, rate)?;
    Ok(fit_length(out, stretched_len(samples.len(), rate)))
}

/// Change duration by `1 / rate` through two resampling passes
///
/// The audio is band-limited down to `floor(R * rate)`, then converted from
/// that rate to `floor(R / rate)` and played back at `R`, so pitch moves with
/// tempo.
pub fn resample_time(
    dsp: &dyn Dsp,
    samples: &[f32],
    sample_rate: u32,
    rate: f64,
) -> Result<Vec<f32>, EffectError> {
    let rate = clamp_rate(rate);
    let intermediate = ((sample_rate as f64 * rate).floor() as u32).max(1);
    let target = ((sample_rate as f64 / rate).floor() as u32).max(1);

    let down = dsp.resample(samples, sample_rate, intermediate)?;
    let back = dsp.resample(&down, intermediate, target)?;
    Ok(fit_length(back, stretched_len(samples.len(), rate)))
}

/// Stretch so the detected tempo becomes `target_bpm`
///
/// Targets below [`MIN_TARGET_BPM`] are raised to it. The resulting ratio is
/// not subject to [`MIN_RATE`], so the floor holds for fast material too; it
/// is capped at [`MAX_RATE`].
pub fn bpm_match(
    dsp: &dyn Dsp,
    samples: &[f32],
    sample_rate: u32,
    target_bpm: f64,
) -> Result<Vec<f32>, EffectError> {
    let target = if target_bpm.is_nan() || target_bpm < MIN_TARGET_BPM {
        warn!(
            requested = target_bpm,
            clamped = MIN_TARGET_BPM,
            "target tempo below floor"
        );
        MIN_TARGET_BPM
    } else {
        target_bpm
    };

    let grid = dsp
        .beat_grid(samples, sample_rate)
        .ok_or(EffectError::TempoUnknown)?;
    let source = grid.bpm as f64;
    if !(source > 0.0) || !source.is_finite() {
        return Err(EffectError::TempoUnknown);
    }

    stretch(dsp, samples, (target / source).min(MAX_RATE))
}
