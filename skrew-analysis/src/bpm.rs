//! Energy-based tempo estimation
//!
//! Fallback for material too short or too sparse for the spectral flux
//! autocorrelation in [`crate::BeatGridAnalyzer`].

use std::collections::VecDeque;

/// Samples per energy chunk when scanning a whole buffer
const CHUNK_SIZE: usize = 1024;

/// Tempo detector fed with consecutive chunks of mono audio
pub struct BpmDetector {
    sample_rate: u32,
    energy_history: VecDeque<f32>,
    onset_times: VecDeque<f32>,
    detected_bpm: Option<f32>,
    time_accumulated: f32,
}

impl BpmDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            energy_history: VecDeque::with_capacity(100),
            onset_times: VecDeque::new(),
            detected_bpm: None,
            time_accumulated: 0.0,
        }
    }

    /// Scan a whole buffer and return its tempo, if one emerges
    pub fn estimate(samples: &[f32], sample_rate: u32) -> Option<f32> {
        let mut detector = Self::new(sample_rate);
        for chunk in samples.chunks(CHUNK_SIZE) {
            detector.process(chunk);
        }
        detector.bpm()
    }

    /// Process a chunk of audio samples
    pub fn process(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        let energy = energy.sqrt();

        self.energy_history.push_back(energy);
        if self.energy_history.len() > 50 {
            self.energy_history.pop_front();
        }

        let avg_energy: f32 =
            self.energy_history.iter().sum::<f32>() / self.energy_history.len() as f32;

        if energy > avg_energy * 1.5 && energy > 0.01 {
            // Debounce: 100ms between onsets
            let last_onset = self.onset_times.back().copied().unwrap_or(-1.0);
            if self.time_accumulated - last_onset > 0.1 {
                self.onset_times.push_back(self.time_accumulated);

                while let Some(&first) = self.onset_times.front() {
                    if self.time_accumulated - first > 30.0 {
                        self.onset_times.pop_front();
                    } else {
                        break;
                    }
                }

                if self.onset_times.len() >= 4 {
                    self.calculate_bpm();
                }
            }
        }

        self.time_accumulated += samples.len() as f32 / self.sample_rate as f32;
    }

    /// Most common inter-onset interval, folded into 70-180 BPM
    fn calculate_bpm(&mut self) {
        let intervals: Vec<f32> = self
            .onset_times
            .iter()
            .zip(self.onset_times.iter().skip(1))
            .map(|(a, b)| b - a)
            .filter(|&interval| interval > 0.2 && interval < 2.0)
            .collect();

        // Histogram quantized to 10ms, 0.0 to 2.0 seconds
        let mut histogram = [0u32; 200];
        for &interval in &intervals {
            let idx = ((interval * 100.0) as usize).min(199);
            histogram[idx] += 1;
        }

        let Some((peak_idx, &count)) = histogram.iter().enumerate().max_by_key(|(_, &c)| c) else {
            return;
        };
        if count == 0 || peak_idx == 0 {
            return;
        }

        let bpm = 60.0 / (peak_idx as f32 / 100.0);
        let normalized_bpm = if bpm < 70.0 {
            bpm * 2.0
        } else if bpm > 180.0 {
            bpm / 2.0
        } else {
            bpm
        };

        self.detected_bpm = Some(normalized_bpm);
    }

    pub fn bpm(&self) -> Option<f32> {
        self.detected_bpm
    }

    pub fn reset(&mut self) {
        self.energy_history.clear();
        self.onset_times.clear();
        self.detected_bpm = None;
        self.time_accumulated = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onset::click_track;

    #[test]
    fn test_estimate_click_track() {
        // 120 BPM at 44.1kHz
        let clicks = click_track(22050, 0, 44100 * 6);
        let bpm = BpmDetector::estimate(&clicks, 44100).expect("tempo");
        assert!((bpm - 120.0).abs() < 10.0, "bpm {}", bpm);
    }

    #[test]
    fn test_silence_has_no_tempo() {
        assert!(BpmDetector::estimate(&vec![0.0; 44100 * 3], 44100).is_none());
    }

    #[test]
    fn test_reset() {
        let mut detector = BpmDetector::new(44100);
        for chunk in click_track(22050, 0, 44100 * 6).chunks(1024) {
            detector.process(chunk);
        }
        assert!(detector.bpm().is_some());
        detector.reset();
        assert!(detector.bpm().is_none());
    }
}
