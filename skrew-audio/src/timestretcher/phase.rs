//! Phase vocoder for pitch-independent time-stretching
//!
//! - Magnitudes interpolated between neighbouring analysis frames
//! - Phase-locking around spectral peaks to preserve harmonic relationships
//! - Transient detection with phase reset (preserves attack clarity)

use skrew_analysis::{Complex, Frame, Spectrogram, Stft, DEFAULT_FFT_SIZE, DEFAULT_HOP_SIZE};
use std::f32::consts::PI;

const TWO_PI: f32 = 2.0 * PI;

/// Phase locking modes for different quality/CPU trade-offs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseLockMode {
    /// No phase locking (fastest, most phasiness)
    None,
    /// Bins near spectral peaks inherit the peak's phase
    #[default]
    PeakLocked,
}

/// Offline phase vocoder over a whole mono buffer
pub struct PhaseVocoder {
    stft: Stft,
    /// Expected phase advance per bin over one hop
    omega: Vec<f32>,
    phase_lock_mode: PhaseLockMode,
    /// Flux-to-energy ratio above which a frame counts as a transient
    transient_threshold: f32,
}

impl Default for PhaseVocoder {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE, DEFAULT_HOP_SIZE)
    }
}

impl PhaseVocoder {
    pub fn new(fft_size: usize, hop_size: usize) -> Self {
        let stft = Stft::new(fft_size, hop_size);

        // omega[k] = 2 * pi * k * hop_size / fft_size
        let omega: Vec<f32> = (0..stft.bins())
            .map(|k| TWO_PI * k as f32 * stft.hop_size() as f32 / stft.fft_size() as f32)
            .collect();

        Self {
            stft,
            omega,
            phase_lock_mode: PhaseLockMode::default(),
            transient_threshold: 0.8,
        }
    }

    pub fn set_phase_lock_mode(&mut self, mode: PhaseLockMode) {
        self.phase_lock_mode = mode;
    }

    /// Lower values reset phase on more frames
    pub fn set_transient_sensitivity(&mut self, threshold: f32) {
        self.transient_threshold = threshold.clamp(0.1, 5.0);
    }

    /// Stretch by `rate`: 2.0 plays twice as fast (half the length), 0.5 twice as slow
    ///
    /// Output length is `round(len / rate)`. Non-positive rates return the input.
    pub fn stretch(&self, samples: &[f32], rate: f64) -> Vec<f32> {
        if samples.is_empty() || rate <= 0.0 || !rate.is_finite() {
            return samples.to_vec();
        }
        let output_len = (samples.len() as f64 / rate).round() as usize;

        let analysis = self.stft.forward(samples);
        let bins = analysis.bins;
        let silent: Frame = vec![Complex::new(0.0, 0.0); bins];

        let mut phase_accum: Vec<f32> = analysis.frames[0].iter().map(|c| c.arg()).collect();
        let mut prev_mags = vec![0.0f32; bins];
        let mut mags = vec![0.0f32; bins];
        let mut frames = Vec::with_capacity((analysis.len() as f64 / rate) as usize + 1);

        let mut t = 0.0f64;
        while t < analysis.len() as f64 {
            let i = t.floor() as usize;
            let alpha = (t - i as f64) as f32;
            let current = &analysis.frames[i];
            let next = analysis.frames.get(i + 1).unwrap_or(&silent);

            for k in 0..bins {
                mags[k] = (1.0 - alpha) * current[k].norm() + alpha * next[k].norm();
            }

            if self.is_transient(&mags, &prev_mags) {
                for (acc, c) in phase_accum.iter_mut().zip(current) {
                    *acc = c.arg();
                }
            }

            let mut frame: Frame = mags
                .iter()
                .zip(&phase_accum)
                .map(|(&mag, &phase)| Complex::from_polar(mag, phase))
                .collect();

            if self.phase_lock_mode == PhaseLockMode::PeakLocked {
                apply_peak_phase_lock(&mut frame, &mags);
            }
            frames.push(frame);

            // Advance by the measured phase increment between the two analysis frames
            for k in 0..bins {
                let delta = wrap_phase(next[k].arg() - current[k].arg() - self.omega[k]);
                phase_accum[k] += self.omega[k] + delta;
            }

            std::mem::swap(&mut prev_mags, &mut mags);
            t += rate;
        }

        self.stft.inverse(&Spectrogram { frames, bins }, output_len)
    }

    /// Spectral flux relative to frame energy
    fn is_transient(&self, mags: &[f32], prev_mags: &[f32]) -> bool {
        let mut flux = 0.0f32;
        let mut total = 0.0f32;
        for (&mag, &prev) in mags.iter().zip(prev_mags) {
            let diff = mag - prev;
            if diff > 0.0 {
                flux += diff * diff;
            }
            total += mag * mag;
        }
        let total = total.sqrt();
        total > 0.001 && flux.sqrt() / total > self.transient_threshold
    }
}

/// Blend the phases of bins around each spectral peak towards the peak's phase
fn apply_peak_phase_lock(frame: &mut [Complex<f32>], mags: &[f32]) {
    let bins = mags.len();
    if bins < 5 {
        return;
    }

    let peaks: Vec<usize> = (2..bins - 2)
        .filter(|&k| {
            let m = mags[k];
            m > mags[k - 2] && m > mags[k - 1] && m > mags[k + 1] && m > mags[k + 2]
        })
        .collect();

    for &peak in &peaks {
        let peak_phase = frame[peak].arg();
        let radius = ((mags[peak] * 10.0) as usize).clamp(1, 5);

        for j in 1..=radius {
            let weight = 1.0 - j as f32 / (radius + 1) as f32;
            for k in [peak.checked_sub(j), Some(peak + j)].into_iter().flatten() {
                if let Some(bin) = frame.get_mut(k) {
                    let blended = blend_phase(bin.arg(), peak_phase, weight);
                    *bin = Complex::from_polar(bin.norm(), blended);
                }
            }
        }
    }
}

/// Wrap phase to [-π, π]
#[inline(always)]
fn wrap_phase(phase: f32) -> f32 {
    phase - TWO_PI * ((phase + PI) / TWO_PI).floor()
}

/// Blend two phases on the unit circle
#[inline(always)]
fn blend_phase(phase1: f32, phase2: f32, weight: f32) -> f32 {
    let (s1, c1) = phase1.sin_cos();
    let (s2, c2) = phase2.sin_cos();
    let s = s1 * (1.0 - weight) + s2 * weight;
    let c = c1 * (1.0 - weight) + c2 * weight;
    s.atan2(c)
}

/// Zero crossings per sample, a cheap frequency proxy for tests
#[cfg(test)]
pub(crate) fn crossing_rate(samples: &[f32]) -> f32 {
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
        .count();
    crossings as f32 / samples.len().max(1) as f32
}

#[cfg(test)]
pub(crate) fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (TWO_PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
        .collect()
}
