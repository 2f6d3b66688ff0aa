//! Harmonic/percussive source separation by median filtering
//!
//! Harmonic content is smooth along time, percussive content is smooth along
//! frequency. Median filtering the magnitude spectrogram in each direction
//! gives the two estimates, which become soft masks.

use crate::stft::{Spectrogram, Stft};

/// Median filter length in both directions
pub const DEFAULT_KERNEL: usize = 31;

const MASK_EPSILON: f32 = 1e-10;

/// Median-filtering separator
#[derive(Debug, Clone, Copy)]
pub struct Hpss {
    kernel: usize,
    power: f32,
}

impl Default for Hpss {
    fn default() -> Self {
        Self {
            kernel: DEFAULT_KERNEL,
            power: 2.0,
        }
    }
}

impl Hpss {
    pub fn new(kernel: usize, power: f32) -> Self {
        Self {
            kernel: kernel.max(1),
            power: power.max(1.0),
        }
    }

    /// Percussive soft mask for each bin of each frame
    pub fn percussive_mask(&self, spectrogram: &Spectrogram) -> Vec<Vec<f32>> {
        let magnitudes = spectrogram.magnitudes();
        let frames = magnitudes.len();
        let bins = spectrogram.bins;

        // Percussive estimate: median across frequency within each frame
        let percussive: Vec<Vec<f32>> = magnitudes
            .iter()
            .map(|frame| median_filter(frame, self.kernel))
            .collect();

        // Harmonic estimate: median across time within each bin
        let mut harmonic = vec![vec![0.0f32; bins]; frames];
        let mut column = vec![0.0f32; frames];
        for bin in 0..bins {
            for (f, frame) in magnitudes.iter().enumerate() {
                column[f] = frame.get(bin).copied().unwrap_or(0.0);
            }
            for (f, value) in median_filter(&column, self.kernel).into_iter().enumerate() {
                harmonic[f][bin] = value;
            }
        }

        percussive
            .iter()
            .zip(&harmonic)
            .map(|(p_frame, h_frame)| {
                p_frame
                    .iter()
                    .zip(h_frame)
                    .map(|(&p, &h)| {
                        let p = p.powf(self.power);
                        let h = h.powf(self.power);
                        p / (p + h + MASK_EPSILON)
                    })
                    .collect()
            })
            .collect()
    }

    /// Percussive component of `samples`, same length as the input
    pub fn percussive(&self, stft: &Stft, samples: &[f32]) -> Vec<f32> {
        let mut spectrogram = stft.forward(samples);
        let mask = self.percussive_mask(&spectrogram);
        for (frame, gains) in spectrogram.frames.iter_mut().zip(&mask) {
            for (c, &g) in frame.iter_mut().zip(gains) {
                *c *= g;
            }
        }
        stft.inverse(&spectrogram, samples.len())
    }
}

/// Centered running median; the window shrinks at the edges
pub fn median_filter(values: &[f32], kernel: usize) -> Vec<f32> {
    let half = kernel / 2;
    let mut window = Vec::with_capacity(kernel);
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            window.clear();
            window.extend_from_slice(&values[lo..hi]);
            window.sort_unstable_by(|a, b| a.total_cmp(b));
            window[window.len() / 2]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onset::click_track;
    use std::f32::consts::PI;

    fn energy(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_median_filter() {
        let values = [1.0, 9.0, 2.0, 3.0, 8.0];
        assert_eq!(median_filter(&values, 3), vec![9.0, 2.0, 3.0, 3.0, 8.0]);
        assert_eq!(median_filter(&[], 3), Vec::<f32>::new());
    }

    #[test]
    fn test_sustained_tone_is_not_percussive() {
        let stft = Stft::default();
        let tone: Vec<f32> = (0..22050 * 2)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 22050.0).sin() * 0.5)
            .collect();
        let percussive = Hpss::default().percussive(&stft, &tone);
        assert_eq!(percussive.len(), tone.len());
        assert!(energy(&percussive) < energy(&tone) * 0.1);
    }

    #[test]
    fn test_clicks_are_percussive() {
        let stft = Stft::default();
        let clicks = click_track(11025, 1000, 22050 * 2);
        let percussive = Hpss::default().percussive(&stft, &clicks);
        assert!(energy(&percussive) > energy(&clicks) * 0.3);
    }
}
