//! Audio analysis for Skrew
//!
//! Short-time Fourier analysis, onset detection, beat grid and tempo
//! estimation, and harmonic/percussive separation. Everything operates on
//! mono `f32` samples.

mod beatgrid;
mod bpm;
mod hpss;
mod onset;
mod stft;

pub use beatgrid::{BeatGrid, BeatGridAnalyzer};
pub use bpm::BpmDetector;
pub use hpss::{median_filter, Hpss};
pub use onset::OnsetDetector;
pub use rustfft::num_complex::Complex;
pub use stft::{amplitude_to_db, Frame, Spectrogram, Stft, DEFAULT_FFT_SIZE, DEFAULT_HOP_SIZE};
