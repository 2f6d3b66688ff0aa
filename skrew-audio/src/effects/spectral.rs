//! Spectral and onset-domain gates
//!
//! Masks are computed on decibel magnitudes (`20 log10`, floored 80 dB below
//! the loudest bin) and resynthesized with the input's phase. Every result is
//! fitted back to the input length.

use super::EffectError;
use crate::dsp::Dsp;
use crate::resample::fit_length;
use skrew_analysis::{amplitude_to_db, Spectrogram, Stft};

/// Smallest magnitude considered when converting to decibels
const AMIN: f32 = 1e-5;
/// Dynamic range kept below the loudest bin
const TOP_DB: f32 = 80.0;
/// Drum envelope attack time in seconds
const ATTACK_SECS: f64 = 0.005;
/// Threshold used when shaping the percussive component
pub const PERCUSSIVE_THRESHOLD_DB: f32 = -40.0;

/// Frequency ranges (Hz) the spectral gate always passes
pub const VOICE_BANDS: [(f32, f32); 2] = [(80.0, 1200.0), (2000.0, 4000.0)];

/// Quick linear attack followed by an `exp(-3t)` decay, peak-normalized
pub fn drum_envelope(len: usize, sample_rate: u32) -> Vec<f32> {
    let attack = ((ATTACK_SECS * sample_rate as f64) as usize).min(len / 4);
    let decay = len - attack;

    let mut env = Vec::with_capacity(len);
    env.extend((0..attack).map(|i| linspace(i, attack, 0.0, 1.0)));
    env.extend((0..decay).map(|i| (-linspace(i, decay, 0.0, 3.0)).exp()));

    let max = env.iter().fold(0.0f32, |m, &v| m.max(v));
    if max > 0.0 {
        env.iter_mut().for_each(|v| *v /= max);
    }
    env
}

#[inline]
fn linspace(i: usize, n: usize, from: f32, to: f32) -> f32 {
    if n <= 1 {
        from
    } else {
        from + (to - from) * i as f32 / (n - 1) as f32
    }
}

/// Per-bin `db > threshold` mask, frame-major
fn threshold_mask(spectrogram: &Spectrogram, threshold_db: f32) -> Vec<Vec<bool>> {
    let db: Vec<Vec<f32>> = spectrogram
        .magnitudes()
        .into_iter()
        .map(|frame| frame.into_iter().map(|m| amplitude_to_db(m, AMIN)).collect())
        .collect();
    let top = db
        .iter()
        .flatten()
        .fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let floor = top - TOP_DB;

    db.into_iter()
        .map(|frame| {
            frame
                .into_iter()
                .map(|v| v.max(floor) > threshold_db)
                .collect()
        })
        .collect()
}

/// Zero bins below `threshold_db`; frames with any surviving bin are shaped by a
/// drum envelope across frequency
pub fn mute(stft: &Stft, samples: &[f32], sample_rate: u32, threshold_db: f32) -> Vec<f32> {
    let mut spectrogram = stft.forward(samples);
    let mask = threshold_mask(&spectrogram, threshold_db);
    let envelope = drum_envelope(spectrogram.bins, sample_rate);

    for (frame, keep) in spectrogram.frames.iter_mut().zip(&mask) {
        let shaped = keep.iter().any(|&k| k);
        for ((c, &k), &e) in frame.iter_mut().zip(keep).zip(&envelope) {
            if !k {
                *c *= 0.0;
            } else if shaped {
                *c *= e;
            }
        }
    }

    fit_length(stft.inverse(&spectrogram, samples.len()), samples.len())
}

/// Pass bins above `threshold_db` plus everything inside [`VOICE_BANDS`]
pub fn spectral_gate(stft: &Stft, samples: &[f32], sample_rate: u32, threshold_db: f32) -> Vec<f32> {
    let mut spectrogram = stft.forward(samples);
    let mask = threshold_mask(&spectrogram, threshold_db);
    let preserved: Vec<bool> = (0..spectrogram.bins)
        .map(|bin| {
            let freq = stft.bin_frequency(bin, sample_rate);
            VOICE_BANDS
                .iter()
                .any(|&(lo, hi)| freq >= lo && freq <= hi)
        })
        .collect();

    for (frame, keep) in spectrogram.frames.iter_mut().zip(&mask) {
        for ((c, &k), &p) in frame.iter_mut().zip(keep).zip(&preserved) {
            if !(k || p) {
                *c *= 0.0;
            }
        }
    }

    fit_length(stft.inverse(&spectrogram, samples.len()), samples.len())
}

/// Keep audio from each onset onward, shaped by a drum envelope per
/// inter-onset segment; audio before the first onset is silenced
pub fn trigger_gate(
    dsp: &dyn Dsp,
    samples: &[f32],
    sample_rate: u32,
    sensitivity: f32,
) -> Result<Vec<f32>, EffectError> {
    let mut onsets = dsp.onsets(samples, sample_rate, sensitivity);
    onsets.retain(|&o| o < samples.len());
    onsets.sort_unstable();
    onsets.dedup();
    if onsets.is_empty() {
        return Err(EffectError::NoOnsets);
    }

    let mut out = vec![0.0f32; samples.len()];
    for (i, &start) in onsets.iter().enumerate() {
        let end = onsets.get(i + 1).copied().unwrap_or(samples.len());
        let envelope = drum_envelope(end - start, sample_rate);
        for ((dst, &src), &e) in out[start..end]
            .iter_mut()
            .zip(&samples[start..end])
            .zip(&envelope)
        {
            *dst = src * e;
        }
    }
    Ok(out)
}

/// Percussive component, then [`mute`] at [`PERCUSSIVE_THRESHOLD_DB`]
pub fn percussive(dsp: &dyn Dsp, stft: &Stft, samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let drums = fit_length(dsp.percussive(samples), samples.len());
    mute(stft, &drums, sample_rate, PERCUSSIVE_THRESHOLD_DB)
}
