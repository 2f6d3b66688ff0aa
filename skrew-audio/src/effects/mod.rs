//! Effect engine: applies validated operations to sample buffers
//!
//! Beat-synchronized effects derive a fresh [`BeatGrid`] from the buffer they
//! receive, select windows with [`windows::active_windows`] and write results
//! through the shared crossfade in [`crossfade`]. Every effect runs on a mono
//! mixdown and returns a new buffer; inputs are never mutated.

mod beat;
pub mod crossfade;
mod echo;
mod matching;
mod spectral;
mod tempo;
pub mod windows;

pub use echo::MAX_ECHOES;
pub use matching::{limit_peak, match_loudness, match_spectral_envelope};
pub use spectral::{drum_envelope, VOICE_BANDS};
pub use tempo::{clamp_rate, MAX_RATE, MIN_RATE, MIN_TARGET_BPM};

use crate::buffer::SampleBuffer;
use crate::dsp::{Dsp, DspError, NativeDsp};
use crate::resample::fit_length;
use rand::rngs::StdRng;
use rand::SeedableRng;
use skrew_analysis::{BeatGrid, Stft};
use skrew_input::{Action, BeatWindow, Effect, Operation, ParseError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use windows::{active_windows, Window};

/// Why one operation left the buffer unchanged
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    #[error(transparent)]
    Invalid(#[from] ParseError),

    #[error("'{0}' is not an audio effect")]
    NotAnEffect(String),

    #[error("buffer is empty")]
    EmptyBuffer,

    #[error("no beats detected")]
    NoBeats,

    #[error("need at least {needed} beats, found {found}")]
    TooFewBeats { needed: usize, found: usize },

    #[error("source tempo could not be estimated")]
    TempoUnknown,

    #[error("no onsets detected")]
    NoOnsets,

    #[error("start sample {start} is outside the buffer ({len} samples)")]
    OutOfRange { start: usize, len: usize },

    #[error("result would be too long")]
    TooLong,

    #[error("result contains non-finite samples")]
    NonFinite,

    #[error(transparent)]
    Dsp(#[from] DspError),
}

/// An operation that failed, and why
#[derive(Debug, Clone, PartialEq)]
pub struct EffectFailure {
    pub operation: Operation,
    pub error: EffectError,
}

/// Outcome of running several operations left to right
#[derive(Debug, Clone)]
pub struct ChainReport {
    pub buffer: SampleBuffer,
    /// Operations that changed the buffer, in order
    pub applied: Vec<Operation>,
    pub failures: Vec<EffectFailure>,
}

impl ChainReport {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Stateless effect processor over an injected [`Dsp`]
#[derive(Clone)]
pub struct EffectEngine {
    dsp: Arc<dyn Dsp>,
    stft: Stft,
    /// Fixed seed for mash shuffles; entropy when unset
    seed: Option<u64>,
    /// Spectral gate threshold run before matching, if enabled
    final_gate: Option<f32>,
}

impl EffectEngine {
    pub fn new(dsp: Arc<dyn Dsp>) -> Self {
        Self {
            dsp,
            stft: Stft::default(),
            seed: None,
            final_gate: None,
        }
    }

    pub fn native() -> Self {
        Self::new(Arc::new(NativeDsp::new()))
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_final_gate(mut self, threshold_db: Option<f32>) -> Self {
        self.final_gate = threshold_db;
        self
    }

    pub fn dsp(&self) -> &dyn Dsp {
        self.dsp.as_ref()
    }

    /// Validate and apply one operation
    pub fn apply(&self, buffer: &SampleBuffer, operation: &Operation) -> Result<SampleBuffer, EffectError> {
        match operation.resolve()? {
            Action::Effect(effect) => self.apply_effect(buffer, &effect),
            Action::Revert(_) | Action::Control(_) => {
                Err(EffectError::NotAnEffect(operation.token().to_string()))
            }
        }
    }

    /// Apply one typed effect to a mono mixdown of `buffer`
    pub fn apply_effect(&self, buffer: &SampleBuffer, effect: &Effect) -> Result<SampleBuffer, EffectError> {
        let mono = buffer.to_mono();
        if mono.is_empty() {
            return Err(EffectError::EmptyBuffer);
        }
        let sr = mono.sample_rate();
        let input = mono.samples();
        let dsp = self.dsp.as_ref();

        let output = match effect {
            Effect::Pitch { semitones } => {
                fit_length(dsp.pitch_shift(input, sr, *semitones)?, input.len())
            }
            Effect::TimeStretch { rate } => tempo::time_stretch(dsp, input, *rate)?,
            Effect::ResampleTime { rate } => tempo::resample_time(dsp, input, sr, *rate)?,
            Effect::BpmMatch { target_bpm } => tempo::bpm_match(dsp, input, sr, *target_bpm)?,
            Effect::Loop(window) => {
                let (_, windows) = self.windows(input, sr, window)?;
                beat::lock(input, &windows)
            }
            Effect::Reverse(window) => {
                let (_, windows) = self.windows(input, sr, window)?;
                beat::reverse(input, &windows)
            }
            Effect::Chop {
                chunk_beats,
                window,
            } => {
                let (grid, windows) = self.windows(input, sr, window)?;
                beat::chop(input, &grid, &windows, *chunk_beats)
            }
            Effect::Stutter { count, window } => {
                let (grid, windows) = self.windows(input, sr, window)?;
                beat::stutter(input, &grid, &windows, *count)
            }
            Effect::Mash { parts, window } => {
                let (_, windows) = self.windows(input, sr, window)?;
                let mut rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                beat::mash(input, &windows, *parts, &mut rng)
            }
            Effect::Echo {
                delay_secs,
                count,
                decay,
            } => echo::echo(input, sr, *delay_secs, *count, *decay)?,
            Effect::Mute { threshold_db } => {
                spectral::mute(&self.stft, input, sr, *threshold_db as f32)
            }
            Effect::TriggerGate { sensitivity } => {
                spectral::trigger_gate(dsp, input, sr, *sensitivity as f32)?
            }
            Effect::SpectralGate { threshold_db } => {
                spectral::spectral_gate(&self.stft, input, sr, *threshold_db as f32)
            }
            Effect::PercussiveExtract => spectral::percussive(dsp, &self.stft, input, sr),
            Effect::CopySegment { start, count } => copy_segment(input, *start, *count)?,
        };

        if output.iter().any(|s| !s.is_finite()) {
            return Err(EffectError::NonFinite);
        }
        debug!(
            effect = effect.name(),
            before = input.len(),
            after = output.len(),
            "effect applied"
        );
        Ok(mono.with_samples(output))
    }

    /// Beat grid for `samples` plus the windows `window` activates on it
    fn windows(
        &self,
        samples: &[f32],
        sample_rate: u32,
        window: &BeatWindow,
    ) -> Result<(BeatGrid, Vec<Window>), EffectError> {
        let grid = self
            .dsp
            .beat_grid(samples, sample_rate)
            .filter(|grid| !grid.is_empty())
            .ok_or(EffectError::NoBeats)?;
        if grid.len() <= window.length {
            return Err(EffectError::TooFewBeats {
                needed: window.length.saturating_add(1),
                found: grid.len(),
            });
        }
        let windows = active_windows(&grid, window);
        Ok((grid, windows))
    }

    /// Apply operations left to right; a failed operation leaves the buffer as it was
    pub fn apply_chain(&self, buffer: &SampleBuffer, operations: &[Operation]) -> ChainReport {
        let mut current = buffer.clone();
        let mut applied = Vec::new();
        let mut failures = Vec::new();

        for operation in operations {
            match self.apply(&current, operation) {
                Ok(next) => {
                    current = next;
                    applied.push(operation.clone());
                }
                Err(error) => {
                    warn!(operation = %operation, %error, "operation failed");
                    failures.push(EffectFailure {
                        operation: operation.clone(),
                        error,
                    });
                }
            }
        }

        ChainReport {
            buffer: current,
            applied,
            failures,
        }
    }

    /// Anchor `processed` to `reference`: optional gate, spectral envelope,
    /// loudness, then a peak guard at 1.0
    pub fn finish(&self, processed: &SampleBuffer, reference: &SampleBuffer) -> SampleBuffer {
        let reference = reference.to_mono();
        let mono = processed.to_mono();
        if mono.is_empty() || reference.is_empty() {
            return mono;
        }
        let sr = mono.sample_rate();

        let gated = match self.final_gate {
            Some(threshold) => spectral::spectral_gate(&self.stft, mono.samples(), sr, threshold),
            None => mono.samples().to_vec(),
        };
        let mut out = match_spectral_envelope(&self.stft, &gated, reference.samples());
        match_loudness(&mut out, reference.samples());
        limit_peak(&mut out, 1.0);
        mono.with_samples(out)
    }

    /// Run one instruction's operations, then post-process against the input
    #[instrument(skip_all, fields(operations = operations.len()))]
    pub fn process(&self, buffer: &SampleBuffer, operations: &[Operation]) -> ChainReport {
        let mut report = self.apply_chain(buffer, operations);
        if report.changed() {
            report.buffer = self.finish(&report.buffer, buffer);
        }
        report
    }
}

impl Default for EffectEngine {
    fn default() -> Self {
        Self::native()
    }
}

/// Overwrite `count` samples from `start` with the value at `start`
fn copy_segment(input: &[f32], start: usize, count: usize) -> Result<Vec<f32>, EffectError> {
    let value = *input.get(start).ok_or(EffectError::OutOfRange {
        start,
        len: input.len(),
    })?;
    let end = start.saturating_add(count).min(input.len());
    let mut out = input.to_vec();
    out[start..end].fill(value);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skrew_input::{parse, OperationKind};

    const SR: u32 = 8000;
    const PERIOD: usize = 2000;

    /// Fixed 240 BPM grid at 8 kHz, identity primitives
    struct GridDsp;

    impl Dsp for GridDsp {
        fn beat_grid(&self, samples: &[f32], sample_rate: u32) -> Option<BeatGrid> {
            Some(BeatGrid::regular(240.0, 0, samples.len(), sample_rate))
        }
        fn pitch_shift(&self, s: &[f32], _: u32, _: f64) -> Result<Vec<f32>, DspError> {
            Ok(s.iter().map(|x| x * 0.5).collect())
        }
        fn time_stretch(&self, s: &[f32], rate: f64) -> Result<Vec<f32>, DspError> {
            Ok(vec![0.1; (s.len() as f64 / rate).round() as usize])
        }
        fn resample(&self, s: &[f32], a: u32, b: u32) -> Result<Vec<f32>, DspError> {
            Ok(vec![0.1; s.len() * b as usize / a as usize])
        }
        fn onsets(&self, _: &[f32], _: u32, _: f32) -> Vec<usize> {
            vec![PERIOD, 3 * PERIOD]
        }
        fn percussive(&self, s: &[f32]) -> Vec<f32> {
            s.to_vec()
        }
    }

    fn engine() -> EffectEngine {
        EffectEngine::new(Arc::new(GridDsp)).with_seed(11)
    }

    fn buffer(beats: usize) -> SampleBuffer {
        let samples = (0..beats * PERIOD)
            .map(|i| ((i as f32) * 0.01).sin() * 0.5)
            .collect();
        SampleBuffer::mono(samples, SR)
    }

    fn op(text: &str) -> Operation {
        parse(text).remove(0)
    }

    #[test]
    fn test_pitch_keeps_length() {
        let input = buffer(4);
        let out = engine().apply(&input, &op("p:2;")).unwrap();
        assert_eq!(out.len(), input.len());
        assert_eq!(out.sample_rate(), SR);
    }

    #[test]
    fn test_echo_scenario() {
        let input = buffer(4);
        let out = engine().apply(&input, &op("echo:0.5:3:0.7;")).unwrap();
        let delay = (SR as f64 * 0.5).floor() as usize;
        assert_eq!(out.len(), input.len() + delay * 3);
        assert!(out.peak() <= 1.0);
    }

    #[test]
    fn test_beat_effects_keep_length() {
        let input = buffer(16);
        for text in ["loop:2:8:4;", "rev:1:2:1;", "chop:4:2:1;", "stut:3:2:1;", "mash:4:4:1;"] {
            let out = engine().apply(&input, &op(text)).unwrap();
            assert_eq!(out.len(), input.len(), "{text}");
            assert_ne!(out.samples(), input.samples(), "{text}");
        }
    }

    #[test]
    fn test_too_few_beats() {
        let input = buffer(4);
        assert!(matches!(
            engine().apply(&input, &op("loop:1:8:1;")),
            Err(EffectError::TooFewBeats { needed: 9, .. })
        ));
    }

    #[test]
    fn test_copy_segment_flattens() {
        let input = SampleBuffer::mono(vec![0.1, 0.2, 0.3, 0.4, 0.5], SR);
        let out = engine().apply(&input, &op("copy:1:2;")).unwrap();
        assert_eq!(out.samples(), &[0.1, 0.2, 0.2, 0.4, 0.5]);

        let out = engine().apply(&input, &op("copy:3:100;")).unwrap();
        assert_eq!(out.samples(), &[0.1, 0.2, 0.3, 0.4, 0.4]);

        assert!(matches!(
            engine().apply(&input, &op("copy:5:1;")),
            Err(EffectError::OutOfRange { start: 5, len: 5 })
        ));
    }

    #[test]
    fn test_unknown_and_control_rejected() {
        let input = buffer(2);
        assert!(matches!(
            engine().apply(&input, &Operation::new(OperationKind::Unknown("zz".into()), vec![])),
            Err(EffectError::Invalid(ParseError::Unknown(_)))
        ));
        assert!(matches!(
            engine().apply(&input, &op("revert:1;")),
            Err(EffectError::NotAnEffect(_))
        ));
    }

    #[test]
    fn test_chain_continues_after_failure() {
        let input = buffer(4);
        let ops = parse("copy:999999:1;p:1;");
        let report = engine().apply_chain(&input, &ops);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.applied, vec![ops[1].clone()]);
        assert!(report.changed());
    }

    #[test]
    fn test_bpm_floor_scenario() {
        let input = buffer(8);
        let report = engine().apply_chain(&input, &parse("chop:4:2:1;bpm:-5;"));
        assert!(report.failures.is_empty());
        assert_eq!(report.applied.len(), 2);
        // 240 BPM down to the 20 BPM floor stretches twelvefold
        assert_eq!(report.buffer.len(), (input.len() as f64 * 12.0).round() as usize);
    }

    #[test]
    fn test_extreme_arguments_never_panic() {
        let input = buffer(16);
        let texts = [
            "loop:4096:1:4096;",
            "loop:1:4096:1;",
            "rev:4096:4096:4096;",
            "chop:4096:4:2:1;",
            "chop:4096:4096:4096:4096;",
            "stut:4096:4096:4096:4096;",
            "stut:4096:1:1;",
            "mash:4096:4096:4096:4096;",
            "mash:4096:4:1;",
            "echo:0:1000:0.5;",
            "echo:0:1000:1;",
            "echo:1e300:1:0.5;",
            "echo:0.001:1000:1e300;",
            "copy:1e30:1e30;",
            "t:1e300;",
            "rt:1e300;",
            "bpm:1e300;",
            "mute:1e300;",
            "n:-1e300;",
            "trig:1e300;",
        ];
        for text in texts {
            if let Ok(out) = engine().apply(&input, &op(text)) {
                assert!(out.samples().iter().all(|s| s.is_finite()), "{text}");
            }
        }
    }

    #[test]
    fn test_unbounded_effects_fail_cleanly() {
        let input = buffer(16);
        let huge = BeatWindow {
            stride: usize::MAX,
            length: usize::MAX,
            repeat: usize::MAX,
        };
        assert!(matches!(
            engine().apply_effect(&input, &Effect::Loop(huge)),
            Err(EffectError::TooFewBeats { needed: usize::MAX, .. })
        ));

        let wide = BeatWindow {
            stride: usize::MAX,
            length: 1,
            repeat: usize::MAX,
        };
        for effect in [
            Effect::Stutter {
                count: usize::MAX,
                window: wide,
            },
            Effect::Chop {
                chunk_beats: usize::MAX,
                window: wide,
            },
            Effect::Mash {
                parts: usize::MAX,
                window: wide,
            },
        ] {
            let out = engine().apply_effect(&input, &effect).unwrap();
            assert_eq!(out.len(), input.len());
        }

        assert!(matches!(
            engine().apply_effect(
                &input,
                &Effect::Echo {
                    delay_secs: 0.0,
                    count: usize::MAX,
                    decay: 0.5
                }
            ),
            Err(EffectError::TooLong)
        ));
    }

    #[test]
    fn test_trigger_gate_uses_onsets() {
        let input = buffer(4);
        let out = engine().apply(&input, &op("trig:0.5;")).unwrap();
        assert!(out.samples()[..PERIOD].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_process_anchors_level() {
        let input = buffer(4);
        let report = engine().process(&input, &parse("p:3;"));
        assert!(report.changed());
        assert!(report.buffer.peak() <= 1.0);
        let ratio = report.buffer.rms() / input.rms();
        assert!((ratio - 1.0).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn test_process_without_changes() {
        let input = buffer(2);
        let report = engine().process(&input, &parse("zz;"));
        assert!(!report.changed());
        assert_eq!(report.buffer, input);
    }
}
