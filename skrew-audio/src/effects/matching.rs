//! Post-processing that anchors tone and level to the pre-edit audio

use crate::buffer::{peak, rms};
use crate::resample::fit_length;
use skrew_analysis::Stft;

const EPSILON: f32 = 1e-8;

/// Rescale each frequency bin so its mean magnitude matches `reference`
pub fn match_spectral_envelope(stft: &Stft, processed: &[f32], reference: &[f32]) -> Vec<f32> {
    if processed.is_empty() || reference.is_empty() {
        return processed.to_vec();
    }
    let target = stft.forward(reference).mean_magnitudes();
    let mut spectrogram = stft.forward(processed);
    let current = spectrogram.mean_magnitudes();

    let gains: Vec<f32> = target
        .iter()
        .zip(&current)
        .map(|(t, c)| t / (c + EPSILON))
        .collect();
    spectrogram.scale_bins(&gains);

    fit_length(stft.inverse(&spectrogram, processed.len()), processed.len())
}

/// Scale `processed` so its RMS equals the reference's
pub fn match_loudness(processed: &mut [f32], reference: &[f32]) {
    let current = rms(processed);
    if current <= EPSILON {
        return;
    }
    let gain = rms(reference) / current;
    processed.iter_mut().for_each(|s| *s *= gain);
}

/// Scale down so the peak does not exceed `ceiling`
pub fn limit_peak(samples: &mut [f32], ceiling: f32) {
    let max = peak(samples);
    if max > ceiling {
        let gain = ceiling / max;
        samples.iter_mut().for_each(|s| *s *= gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, amp: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / 22050.0).sin() * amp)
            .collect()
    }

    #[test]
    fn test_loudness_matches_reference() {
        let reference = sine(440.0, 0.5, 4096);
        let mut processed = sine(440.0, 0.1, 4096);
        match_loudness(&mut processed, &reference);
        assert!((rms(&processed) - rms(&reference)).abs() < 1e-4);
    }

    #[test]
    fn test_silence_is_left_alone() {
        let mut processed = vec![0.0f32; 128];
        match_loudness(&mut processed, &[0.5; 128]);
        assert!(processed.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_envelope_restores_level() {
        let stft = Stft::default();
        let reference = sine(440.0, 0.5, 22050);
        let processed = sine(440.0, 0.05, 22050);
        let out = match_spectral_envelope(&stft, &processed, &reference);
        assert_eq!(out.len(), processed.len());
        let mid = 4096..18000;
        let ratio = rms(&out[mid.clone()]) / rms(&reference[mid]);
        assert!((ratio - 1.0).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn test_limit_peak() {
        let mut samples = vec![0.5, -2.0, 1.0];
        limit_peak(&mut samples, 1.0);
        assert_eq!(samples, vec![0.25, -1.0, 0.5]);

        let mut quiet = vec![0.5, -0.2];
        limit_peak(&mut quiet, 1.0);
        assert_eq!(quiet, vec![0.5, -0.2]);
    }
}
