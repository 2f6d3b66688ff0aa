//! Spectral flux onset detection
//!
//! Transients (kicks, snares) cause large positive changes in the magnitude
//! spectrum between consecutive frames. The half-wave rectified sum of those
//! changes is the onset strength envelope.

use crate::stft::{Stft, DEFAULT_FFT_SIZE, DEFAULT_HOP_SIZE};

/// Minimum spacing between two reported onsets, in seconds
const MIN_ONSET_SPACING_SECS: f32 = 0.05;

/// Onset strength and peak picking on mono audio
pub struct OnsetDetector {
    sample_rate: u32,
    stft: Stft,
}

impl OnsetDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            stft: Stft::new(DEFAULT_FFT_SIZE, DEFAULT_HOP_SIZE),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn hop_size(&self) -> usize {
        self.stft.hop_size()
    }

    /// Onset frames per second
    pub fn frame_rate(&self) -> f32 {
        self.sample_rate as f32 / self.hop_size() as f32
    }

    /// Normalized (0.0 - 1.0) onset strength, one value per hop
    ///
    /// Value `f` describes the frame centered on sample `f * hop_size`.
    pub fn strength(&self, samples: &[f32]) -> Vec<f32> {
        let spectrogram = self.stft.forward(samples);
        let magnitudes = spectrogram.magnitudes();

        let mut onset_fn = Vec::with_capacity(magnitudes.len());
        let mut prev: Option<&Vec<f32>> = None;
        for spectrum in &magnitudes {
            let flux = match prev {
                Some(prev) => spectrum
                    .iter()
                    .zip(prev.iter())
                    .map(|(curr, prev)| (curr - prev).max(0.0))
                    .sum(),
                None => 0.0,
            };
            onset_fn.push(flux);
            prev = Some(spectrum);
        }

        let max = onset_fn.iter().cloned().fold(0.0f32, f32::max);
        if max > 0.0 {
            for v in &mut onset_fn {
                *v /= max;
            }
        }

        onset_fn
    }

    /// Local maxima of the onset envelope above a threshold
    ///
    /// With no explicit threshold an adaptive one is used: mean + 0.5 * std_dev,
    /// never below 0.1. An explicit threshold can only raise it.
    pub fn peaks(&self, onset_fn: &[f32], threshold: Option<f32>) -> Vec<usize> {
        if onset_fn.len() < 3 {
            return Vec::new();
        }

        let mean: f32 = onset_fn.iter().sum::<f32>() / onset_fn.len() as f32;
        let variance: f32 =
            onset_fn.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / onset_fn.len() as f32;
        let adaptive = (mean + 0.5 * variance.sqrt()).max(0.1);
        let threshold = match threshold {
            Some(t) => adaptive.max(t),
            None => adaptive,
        };

        let min_distance =
            ((self.sample_rate as f32 * MIN_ONSET_SPACING_SECS) as usize / self.hop_size()).max(1);

        let mut peaks = Vec::new();
        let mut last_peak: Option<usize> = None;

        for i in 1..onset_fn.len() - 1 {
            let spaced = last_peak.map_or(true, |last| i - last >= min_distance);
            if onset_fn[i] > threshold
                && onset_fn[i] > onset_fn[i - 1]
                && onset_fn[i] >= onset_fn[i + 1]
                && spaced
            {
                peaks.push(i);
                last_peak = Some(i);
            }
        }

        peaks
    }

    /// Onset positions in samples; `sensitivity` (0.0 - 1.0) is the minimum
    /// normalized strength a peak must reach
    pub fn detect(&self, samples: &[f32], sensitivity: f32) -> Vec<usize> {
        let onset_fn = self.strength(samples);
        let threshold = sensitivity.clamp(0.0, 1.0);
        self.peaks(&onset_fn, Some(threshold))
            .into_iter()
            .map(|frame| frame * self.hop_size())
            .filter(|&pos| pos < samples.len())
            .collect()
    }
}

/// Build a click track: short decaying noise bursts every `interval` samples
#[cfg(test)]
pub(crate) fn click_track(interval: usize, offset: usize, len: usize) -> Vec<f32> {
    let mut samples = vec![0.0f32; len];
    let mut seed = 0x2545_f491u32;
    let mut pos = offset;
    while pos < len {
        for i in 0..400.min(len - pos) {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let noise = (seed as f32 / u32::MAX as f32) * 2.0 - 1.0;
            samples[pos + i] = noise * (-(i as f32) / 80.0).exp() * 0.8;
        }
        pos += interval;
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_is_normalized() {
        let detector = OnsetDetector::new(44100);
        let strength = detector.strength(&click_track(22050, 1000, 44100 * 3));
        let max = strength.iter().cloned().fold(0.0f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
        assert!(strength.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_detect_finds_clicks() {
        let detector = OnsetDetector::new(44100);
        let clicks = click_track(22050, 4410, 44100 * 4);
        let onsets = detector.detect(&clicks, 0.3);

        // Clicks at 4410, 26460, 48510, ... (8 in four seconds)
        assert!(onsets.len() >= 6 && onsets.len() <= 9, "{:?}", onsets);
        for pair in onsets.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        let first = onsets[0] as isize;
        assert!((first - 4410).abs() <= 2048, "first onset at {}", first);
    }

    #[test]
    fn test_silence_has_no_onsets() {
        let detector = OnsetDetector::new(22050);
        assert!(detector.detect(&vec![0.0; 22050], 0.1).is_empty());
    }
}
