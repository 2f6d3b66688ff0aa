//! Signal-processing primitives the effect engine builds on
//!
//! [`Dsp`] is the seam between the beat-indexed effect algorithms and the
//! heavy lifting (stretching, resampling, analysis). [`NativeDsp`] implements
//! it with the phase vocoder, rubato and `skrew-analysis`; tests substitute
//! fixed beat grids through the same trait.

use crate::resample::resample;
use crate::timestretcher::{PhaseVocoder, PitchShifter};
use skrew_analysis::{BeatGrid, BeatGridAnalyzer, Hpss, OnsetDetector, Stft};
use thiserror::Error;

/// Failures inside a DSP primitive
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("invalid sample rate conversion {source_rate} Hz -> {target_rate} Hz")]
    InvalidRate { source_rate: u32, target_rate: u32 },
    #[error("resampler error: {0}")]
    Resample(String),
}

/// Primitive operations over mono samples
pub trait Dsp: Send + Sync {
    /// Beat boundaries and tempo, `None` when no rhythm is found
    fn beat_grid(&self, samples: &[f32], sample_rate: u32) -> Option<BeatGrid>;

    /// Shift pitch by `semitones` keeping the length
    fn pitch_shift(
        &self,
        samples: &[f32],
        sample_rate: u32,
        semitones: f64,
    ) -> Result<Vec<f32>, DspError>;

    /// Stretch so the output lasts `len / rate` samples, pitch unchanged
    fn time_stretch(&self, samples: &[f32], rate: f64) -> Result<Vec<f32>, DspError>;

    /// Band-limited sample rate conversion
    fn resample(
        &self,
        samples: &[f32],
        source_rate: u32,
        target_rate: u32,
    ) -> Result<Vec<f32>, DspError>;

    /// Onset positions in samples
    fn onsets(&self, samples: &[f32], sample_rate: u32, sensitivity: f32) -> Vec<usize>;

    /// Percussive component, same length as the input
    fn percussive(&self, samples: &[f32]) -> Vec<f32>;
}

/// In-process implementation of [`Dsp`]
#[derive(Default)]
pub struct NativeDsp {
    vocoder: PhaseVocoder,
    pitch: PitchShifter,
    hpss: Hpss,
    stft: Stft,
}

impl NativeDsp {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dsp for NativeDsp {
    fn beat_grid(&self, samples: &[f32], sample_rate: u32) -> Option<BeatGrid> {
        BeatGridAnalyzer::new(sample_rate).analyze(samples)
    }

    fn pitch_shift(
        &self,
        samples: &[f32],
        sample_rate: u32,
        semitones: f64,
    ) -> Result<Vec<f32>, DspError> {
        self.pitch.shift(samples, sample_rate, semitones)
    }

    fn time_stretch(&self, samples: &[f32], rate: f64) -> Result<Vec<f32>, DspError> {
        Ok(self.vocoder.stretch(samples, rate))
    }

    fn resample(
        &self,
        samples: &[f32],
        source_rate: u32,
        target_rate: u32,
    ) -> Result<Vec<f32>, DspError> {
        resample(samples, source_rate, target_rate)
    }

    fn onsets(&self, samples: &[f32], sample_rate: u32, sensitivity: f32) -> Vec<usize> {
        OnsetDetector::new(sample_rate).detect(samples, sensitivity)
    }

    fn percussive(&self, samples: &[f32]) -> Vec<f32> {
        self.hpss.percussive(&self.stft, samples)
    }
}
