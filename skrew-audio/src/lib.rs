//! Audio engine for Skrew - effects, time stretching, playback
//!
//! This crate provides the processing side of a session:
//! - SampleBuffer: owned samples with their format
//! - Dsp: pitch shift, time stretch, resampling and analysis primitives
//! - EffectEngine: beat-synchronized and spectral effects over buffers
//! - PlaybackEngine: looping device output of the working buffer
//! - Timestretcher: phase vocoder for pitch-independent tempo

mod buffer;
mod dsp;
pub mod effects;
mod playback;
mod resample;
pub mod timestretcher;

pub use buffer::{peak, rms, SampleBuffer};
pub use dsp::{Dsp, DspError, NativeDsp};
pub use effects::{ChainReport, EffectEngine, EffectError, EffectFailure};
pub use playback::{render, PlaybackEngine, PlaybackError, PlaybackState};
pub use resample::{fit_length, resample};
pub use timestretcher::{PhaseLockMode, PhaseVocoder, PitchShifter};
