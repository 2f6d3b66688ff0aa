//! Beat grid analysis
//!
//! Estimates tempo via autocorrelation of the spectral flux onset envelope,
//! aligns the first beat to the strongest onsets, then walks the track one
//! beat period at a time, snapping each predicted beat to a nearby onset.

use crate::bpm::BpmDetector;
use crate::onset::OnsetDetector;
use tracing::debug;

/// Onsets weaker than this never pull a predicted beat
const SNAP_MIN_STRENGTH: f32 = 0.1;

/// Ordered beat boundaries for one buffer
#[derive(Debug, Clone, PartialEq)]
pub struct BeatGrid {
    /// Sample index of each beat, strictly increasing
    frames: Vec<usize>,
    /// Estimated tempo
    pub bpm: f32,
    /// Confidence score (0.0 - 1.0) indicating detection reliability
    pub confidence: f32,
}

impl BeatGrid {
    /// Build a grid from beat positions; they are sorted and deduplicated
    pub fn new(mut frames: Vec<usize>, bpm: f32, confidence: f32) -> Self {
        frames.sort_unstable();
        frames.dedup();
        Self {
            frames,
            bpm,
            confidence,
        }
    }

    /// Evenly spaced grid starting at `first_beat`, covering `len` samples
    pub fn regular(bpm: f32, first_beat: usize, len: usize, sample_rate: u32) -> Self {
        let period = 60.0 / bpm.max(1.0) as f64 * sample_rate as f64;
        let mut frames = Vec::new();
        let mut beat = 0u64;
        loop {
            let pos = first_beat as f64 + beat as f64 * period;
            if pos >= len as f64 {
                break;
            }
            frames.push(pos.round() as usize);
            beat += 1;
        }
        Self::new(frames, bpm, 1.0)
    }

    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sample range `[start, end)` from beat `beat` spanning `span` beats
    pub fn span(&self, beat: usize, span: usize) -> Option<(usize, usize)> {
        let start = *self.frames.get(beat)?;
        let end = *self.frames.get(beat.checked_add(span)?)?;
        Some((start, end))
    }

    pub fn samples_per_beat(&self, sample_rate: u32) -> f64 {
        60.0 / self.bpm.max(1.0) as f64 * sample_rate as f64
    }
}

/// Builds a [`BeatGrid`] from mono audio
pub struct BeatGridAnalyzer {
    sample_rate: u32,
    onsets: OnsetDetector,
}

impl BeatGridAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            onsets: OnsetDetector::new(sample_rate),
        }
    }

    /// Analyze mono samples; `None` when no tempo can be established
    pub fn analyze(&self, samples: &[f32]) -> Option<BeatGrid> {
        let onset_fn = self.onsets.strength(samples);
        if onset_fn.len() < 8 {
            return None;
        }

        let onsets = self.onsets.peaks(&onset_fn, None);

        let (bpm, confidence) = match self.estimate_bpm_autocorrelation(&onset_fn) {
            Some(estimate) => estimate,
            None => (BpmDetector::estimate(samples, self.sample_rate)?, 0.0),
        };

        let first_beat = self.find_first_downbeat(&onsets, bpm);
        let hop = self.onsets.hop_size();
        let frames: Vec<usize> = self
            .track_beats(&onset_fn, first_beat, bpm)
            .into_iter()
            .map(|frame| frame * hop)
            .filter(|&pos| pos < samples.len())
            .collect();

        debug!(
            bpm,
            confidence,
            beats = frames.len(),
            "beat grid analyzed"
        );

        Some(BeatGrid::new(frames, bpm, confidence))
    }

    /// Compute correlation at a specific lag
    fn correlation_at_lag(&self, onset_fn: &[f32], lag: usize) -> f32 {
        if lag == 0 || lag >= onset_fn.len() / 2 {
            return 0.0;
        }

        let mut correlation: f32 = 0.0;
        let mut norm_a: f32 = 0.0;
        let mut norm_b: f32 = 0.0;

        for i in 0..(onset_fn.len() - lag) {
            correlation += onset_fn[i] * onset_fn[i + lag];
            norm_a += onset_fn[i] * onset_fn[i];
            norm_b += onset_fn[i + lag] * onset_fn[i + lag];
        }

        let norm = (norm_a * norm_b).sqrt();
        if norm > 0.0 {
            correlation / norm
        } else {
            0.0
        }
    }

    /// Estimate BPM using autocorrelation of the onset function
    ///
    /// The lag with the highest correlation in the 60-200 BPM range is the
    /// beat period. Needs at least two periods of the slowest tempo.
    fn estimate_bpm_autocorrelation(&self, onset_fn: &[f32]) -> Option<(f32, f32)> {
        let frames_per_second = self.onsets.frame_rate();
        let min_lag = ((frames_per_second * 60.0 / 200.0) as usize).max(1);
        let max_lag = (frames_per_second * 60.0 / 60.0) as usize;

        if onset_fn.len() < max_lag * 2 {
            return None;
        }

        // First ~8 seconds is enough
        let analysis_len = onset_fn.len().min(max_lag * 8);
        let analysis = &onset_fn[..analysis_len];

        let mut best_lag = min_lag;
        let mut best_correlation = 0.0f32;

        for lag in min_lag..=max_lag.min(analysis_len / 2 - 1) {
            let correlation = self.correlation_at_lag(analysis, lag);
            if correlation > best_correlation {
                best_correlation = correlation;
                best_lag = lag;
            }
        }

        if best_correlation <= 0.0 {
            return None;
        }

        let raw_bpm = 60.0 * frames_per_second / best_lag as f32;
        let final_bpm = self.disambiguate_octave(analysis, raw_bpm, frames_per_second);

        Some((final_bpm, best_correlation.clamp(0.0, 1.0)))
    }

    /// Disambiguate between octave-related BPM values (e.g., 77 vs 154)
    fn disambiguate_octave(&self, onset_fn: &[f32], raw_bpm: f32, frames_per_second: f32) -> f32 {
        if raw_bpm < 65.0 {
            return raw_bpm * 2.0;
        }
        if raw_bpm > 185.0 {
            return raw_bpm / 2.0;
        }

        let lag_for = |bpm: f32| (frames_per_second * 60.0 / bpm) as usize;

        // Ambiguous low range: prefer the doubled tempo when it correlates nearly as well
        if (65.0..=95.0).contains(&raw_bpm) {
            let doubled_bpm = raw_bpm * 2.0;
            let original_corr = self.correlation_at_lag(onset_fn, lag_for(raw_bpm));
            let doubled_corr = self.correlation_at_lag(onset_fn, lag_for(doubled_bpm));

            let doubled_is_reasonable = (120.0..=180.0).contains(&doubled_bpm);
            if doubled_is_reasonable && doubled_corr / original_corr.max(0.001) > 0.7 {
                return doubled_bpm;
            }
        }

        // High range: only halve when the half tempo is clearly stronger
        if (170.0..=185.0).contains(&raw_bpm) {
            let halved_bpm = raw_bpm / 2.0;
            let original_corr = self.correlation_at_lag(onset_fn, lag_for(raw_bpm));
            let halved_corr = self.correlation_at_lag(onset_fn, lag_for(halved_bpm));
            if halved_corr > original_corr * 1.2 {
                return halved_bpm;
            }
        }

        raw_bpm
    }

    /// Find the first beat (onset frame) by aligning a grid to the strongest onsets
    fn find_first_downbeat(&self, onsets: &[usize], bpm: f32) -> usize {
        let Some(&first) = onsets.first() else {
            return 0;
        };

        let beat_interval_frames = (self.onsets.frame_rate() * 60.0 / bpm) as usize;
        if beat_interval_frames == 0 {
            return first;
        }
        let tolerance = beat_interval_frames / 6;

        // Score each of the first onsets by how many of the next 16 expected beats line up
        let mut best_onset = first;
        let mut best_score = 0.0f32;

        for &onset in onsets.iter().take(32) {
            let mut score = 0.0;
            for beat_num in 0..16 {
                let expected = onset + beat_num * beat_interval_frames;
                if onsets.iter().any(|&actual| actual.abs_diff(expected) <= tolerance) {
                    score += 1.0 / (beat_num as f32 + 1.0);
                }
            }

            if score > best_score {
                best_score = score;
                best_onset = onset;
            }
        }

        best_onset
    }

    /// Walk beats across the whole envelope, in onset frames
    ///
    /// Beats before `first_beat` are extrapolated backwards at the nominal
    /// period. Later beats snap to the strongest onset within a sixth of a
    /// period of the prediction.
    fn track_beats(&self, onset_fn: &[f32], first_beat: usize, bpm: f32) -> Vec<usize> {
        let period = self.onsets.frame_rate() * 60.0 / bpm;
        if period < 1.0 || onset_fn.is_empty() {
            return Vec::new();
        }
        let tolerance = (period / 6.0).floor() as usize;

        let mut beats = Vec::new();

        let mut back = first_beat as f32 - period;
        while back >= 0.0 {
            beats.push(back.round() as usize);
            back -= period;
        }
        beats.reverse();

        let mut pos = first_beat as f32;
        while (pos.round() as usize) < onset_fn.len() {
            beats.push(pos.round() as usize);

            let predicted = pos + period;
            let center = predicted.round() as usize;
            let lo = center.saturating_sub(tolerance);
            let hi = (center + tolerance).min(onset_fn.len().saturating_sub(1));

            pos = predicted;
            if lo <= hi {
                let snapped = (lo..=hi)
                    .filter(|&f| onset_fn[f] >= SNAP_MIN_STRENGTH)
                    .max_by(|&a, &b| onset_fn[a].total_cmp(&onset_fn[b]));
                if let Some(frame) = snapped {
                    pos = frame as f32;
                }
            }
        }

        beats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onset::click_track;

    #[test]
    fn test_regular_grid() {
        let grid = BeatGrid::regular(120.0, 0, 44100 * 2, 44100);
        assert_eq!(grid.frames(), &[0, 22050, 44100, 66150]);
        assert_eq!(grid.span(1, 2), Some((22050, 66150)));
        assert_eq!(grid.span(3, 1), None);
    }

    #[test]
    fn test_new_enforces_strict_order() {
        let grid = BeatGrid::new(vec![300, 100, 200, 200], 120.0, 1.0);
        assert_eq!(grid.frames(), &[100, 200, 300]);
    }

    #[test]
    fn test_analyze_click_track() {
        // 120 BPM clicks starting at 0.25s
        let sr = 44100;
        let clicks = click_track(22050, 11025, sr as usize * 8);
        let grid = BeatGridAnalyzer::new(sr).analyze(&clicks).expect("grid");

        assert!((grid.bpm - 120.0).abs() < 3.0, "bpm {}", grid.bpm);
        assert!(grid.len() >= 14, "beats {}", grid.len());
        for pair in grid.frames().windows(2) {
            assert!(pair[1] > pair[0]);
            let spacing = (pair[1] - pair[0]) as f64;
            assert!((spacing - 22050.0).abs() < 2048.0, "spacing {}", spacing);
        }
    }

    #[test]
    fn test_analyze_silence() {
        assert!(BeatGridAnalyzer::new(44100).analyze(&vec![0.0; 44100 * 4]).is_none());
    }

    #[test]
    fn test_analyze_too_short() {
        assert!(BeatGridAnalyzer::new(44100).analyze(&[0.1; 1000]).is_none());
    }
}
