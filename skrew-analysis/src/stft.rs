//! Short-time Fourier transform with overlap-add resynthesis
//!
//! Frames are centered: the signal is zero-padded by half a window on both
//! sides, so frame `f` is centered on sample `f * hop_size`.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Analysis window length used across the crate
pub const DEFAULT_FFT_SIZE: usize = 2048;
/// Hop between frames (~11.6ms at 44.1kHz)
pub const DEFAULT_HOP_SIZE: usize = 512;

/// Window-sum values below this are treated as zero during resynthesis
const WINDOW_SUM_FLOOR: f32 = 1e-8;

/// Non-negative frequency bins of one frame (`fft_size / 2 + 1` values)
pub type Frame = Vec<Complex<f32>>;

/// Sequence of analysis frames
#[derive(Debug, Clone, Default)]
pub struct Spectrogram {
    pub frames: Vec<Frame>,
    pub bins: usize,
}

impl Spectrogram {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Magnitude of every bin, frame-major
    pub fn magnitudes(&self) -> Vec<Vec<f32>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect())
            .collect()
    }

    /// Average magnitude per bin across all frames
    pub fn mean_magnitudes(&self) -> Vec<f32> {
        let mut sums = vec![0.0f32; self.bins];
        if self.frames.is_empty() {
            return sums;
        }
        for frame in &self.frames {
            for (sum, c) in sums.iter_mut().zip(frame) {
                *sum += c.norm();
            }
        }
        let count = self.frames.len() as f32;
        for sum in &mut sums {
            *sum /= count;
        }
        sums
    }

    /// Scale every frame bin-wise by `gains`
    pub fn scale_bins(&mut self, gains: &[f32]) {
        for frame in &mut self.frames {
            for (c, &g) in frame.iter_mut().zip(gains) {
                *c *= g;
            }
        }
    }
}

/// Forward/inverse STFT with a periodic Hann window
#[derive(Clone)]
pub struct Stft {
    fft_size: usize,
    hop_size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl Default for Stft {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE, DEFAULT_HOP_SIZE)
    }
}

impl Stft {
    /// Create a transform; `fft_size` is rounded up to an even length
    pub fn new(fft_size: usize, hop_size: usize) -> Self {
        let fft_size = (fft_size.max(2) + 1) & !1;
        let hop_size = hop_size.clamp(1, fft_size);
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let window: Vec<f32> = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / fft_size as f32).cos()))
            .collect();

        Self {
            fft_size,
            hop_size,
            forward,
            inverse,
            window,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Center frequency of `bin` in Hz
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.fft_size as f32
    }

    /// Analyze `samples` into centered frames
    pub fn forward(&self, samples: &[f32]) -> Spectrogram {
        let bins = self.bins();
        if samples.is_empty() {
            return Spectrogram {
                frames: Vec::new(),
                bins,
            };
        }

        let pad = self.fft_size / 2;
        let padded_len = samples.len() + 2 * pad;
        let frame_count = 1 + (padded_len - self.fft_size) / self.hop_size;

        let mut frames = Vec::with_capacity(frame_count);
        let mut buffer = vec![Complex::new(0.0, 0.0); self.fft_size];

        for f in 0..frame_count {
            let start = f * self.hop_size;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = (start + i)
                    .checked_sub(pad)
                    .and_then(|idx| samples.get(idx))
                    .copied()
                    .unwrap_or(0.0);
                *slot = Complex::new(sample * self.window[i], 0.0);
            }
            self.forward.process(&mut buffer);
            frames.push(buffer[..bins].to_vec());
        }

        Spectrogram { frames, bins }
    }

    /// Resynthesize `length` samples by weighted overlap-add
    ///
    /// Output is zero-padded or truncated to exactly `length`.
    pub fn inverse(&self, spectrogram: &Spectrogram, length: usize) -> Vec<f32> {
        let pad = self.fft_size / 2;
        let span = spectrogram.frames.len().saturating_sub(1) * self.hop_size + self.fft_size;
        let total = span.max(pad + length);

        let mut output = vec![0.0f32; total];
        let mut window_sum = vec![0.0f32; total];
        let mut buffer = vec![Complex::new(0.0, 0.0); self.fft_size];
        let scale = 1.0 / self.fft_size as f32;

        for (f, frame) in spectrogram.frames.iter().enumerate() {
            // Rebuild the full Hermitian spectrum from the positive bins
            for (k, slot) in buffer.iter_mut().enumerate() {
                let mirrored = if k <= pad { k } else { self.fft_size - k };
                let value = frame.get(mirrored).copied().unwrap_or_default();
                *slot = if k <= pad { value } else { value.conj() };
            }
            self.inverse.process(&mut buffer);

            let start = f * self.hop_size;
            for (i, c) in buffer.iter().enumerate() {
                let w = self.window[i];
                output[start + i] += c.re * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, &sum) in output.iter_mut().zip(&window_sum) {
            if sum > WINDOW_SUM_FLOOR {
                *sample /= sum;
            }
        }

        output.into_iter().skip(pad).take(length).collect()
    }
}

/// Convert an amplitude to decibels relative to 1.0, floored at `amin`
pub fn amplitude_to_db(amplitude: f32, amin: f32) -> f32 {
    20.0 * amplitude.max(amin).log10()
}
