//! Time-stretching and pitch-shifting
//!
//! # Algorithm Details
//!
//! The phase vocoder works by:
//! 1. Windowing input into overlapping frames (STFT)
//! 2. Stepping through the frames at the stretch rate, interpolating magnitudes
//! 3. Accumulating phase from the measured per-bin frequency
//! 4. Overlap-add resynthesis at the original hop
//!
//! Pitch shifting stretches by `2^(-n/12)` and resamples back to the original
//! duration, so pitch moves by `n` semitones and length is unchanged.

mod phase;

pub use phase::{PhaseLockMode, PhaseVocoder};

#[cfg(test)]
pub(crate) use phase::{crossing_rate, sine};

use crate::dsp::DspError;
use crate::resample::{fit_length, resample};

/// Pitch shift without tempo change: phase vocoder + resampling
#[derive(Default)]
pub struct PitchShifter {
    vocoder: PhaseVocoder,
}

impl PitchShifter {
    pub fn new(vocoder: PhaseVocoder) -> Self {
        Self { vocoder }
    }

    /// Shift mono `samples` by `semitones`; the output has the input's length
    pub fn shift(
        &self,
        samples: &[f32],
        sample_rate: u32,
        semitones: f64,
    ) -> Result<Vec<f32>, DspError> {
        if semitones == 0.0 || samples.is_empty() {
            return Ok(samples.to_vec());
        }

        let rate = 2.0f64.powf(-semitones / 12.0);
        let stretched = self.vocoder.stretch(samples, rate);

        // Treat the stretched audio as recorded at sr / rate and bring it back to sr
        let source_rate = (sample_rate as f64 / rate).round().max(1.0) as u32;
        let shifted = resample(&stretched, source_rate, sample_rate)?;

        Ok(fit_length(shifted, samples.len()))
    }
}
