//! Owned sample buffers passed between the session, worker and playback

/// Interleaved `f32` samples with their channel count and sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Create a buffer; a zero channel count is treated as mono
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    /// New buffer with the same format and different content
    pub fn with_samples(&self, samples: Vec<f32>) -> Self {
        Self {
            samples,
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total sample count across channels
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average the channels into one
    pub fn to_mono(&self) -> SampleBuffer {
        if self.channels == 1 {
            return self.clone();
        }
        let channels = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        SampleBuffer::mono(samples, self.sample_rate)
    }

    pub fn peak(&self) -> f32 {
        peak(&self.samples)
    }

    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// Largest absolute sample value
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Root mean square level
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_mono_averages_frames() {
        let stereo = SampleBuffer::new(vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, 48000);
        let mono = stereo.to_mono();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.sample_rate(), 48000);
        assert_eq!(mono.samples(), &[0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_duration() {
        let buffer = SampleBuffer::new(vec![0.0; 88200], 2, 44100);
        assert_eq!(buffer.frames(), 44100);
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_levels() {
        let buffer = SampleBuffer::mono(vec![0.5, -0.5, 0.5, -0.5], 8000);
        assert_eq!(buffer.peak(), 0.5);
        assert!((buffer.rms() - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_zero_channels_is_mono() {
        assert_eq!(SampleBuffer::new(vec![0.0], 0, 100).channels(), 1);
    }
}
