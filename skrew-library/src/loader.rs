//! Audio file loading and decoding

use skrew_audio::{resample, SampleBuffer};
use std::path::Path;
use symphonia::core::audio::SampleBuffer as DecodeBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors that can occur during track loading
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("File contains no audio samples")]
    Empty,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Resample error: {0}")]
    Resample(#[from] skrew_audio::DspError),
}

/// Track metadata
#[derive(Debug, Clone, Default)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub duration_secs: f64,
    /// Rate of the file before any conversion
    pub source_sample_rate: u32,
    /// Channel count of the file before the mono mixdown
    pub source_channels: u16,
}

/// A loaded, decoded and downmixed audio track
pub struct LoadedTrack {
    /// Mono samples normalized to -1.0 to 1.0
    pub buffer: SampleBuffer,
    pub metadata: TrackMetadata,
}

/// Audio file loader using Symphonia
#[derive(Debug, Default)]
pub struct TrackLoader {
    /// Convert to this rate after decoding; the file's own rate when unset
    target_sample_rate: Option<u32>,
}

impl TrackLoader {
    /// Loader that keeps the file's sample rate
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new track loader with specific sample rate
    pub fn with_sample_rate(target_sample_rate: u32) -> Self {
        Self {
            target_sample_rate: Some(target_sample_rate),
        }
    }

    /// Load, decode and downmix an audio file
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn load(&self, path: &Path) -> Result<LoadedTrack, LoadError> {
        // Open the file
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create hint from file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        // Probe the format
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut format = probed.format;

        // Find first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let source_sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let mut channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut metadata = extract_metadata(&mut format, path);
        metadata.source_sample_rate = source_sample_rate;

        // Decode all samples, interleaved
        let mut samples: Vec<f32> = Vec::new();
        let mut skipped = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "stopping at unreadable packet");
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };

            let spec = *decoded.spec();
            channels = spec.channels.count() as u16;
            let mut sample_buf = DecodeBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        if skipped > 0 {
            debug!(skipped, "skipped undecodable packets");
        }
        if samples.is_empty() {
            return Err(LoadError::Empty);
        }

        metadata.source_channels = channels;
        let mono = SampleBuffer::new(samples, channels, source_sample_rate).to_mono();
        metadata.duration_secs = mono.duration_secs();

        let buffer = match self.target_sample_rate {
            Some(target) if target != source_sample_rate => {
                let converted = resample(mono.samples(), source_sample_rate, target)?;
                SampleBuffer::mono(converted, target)
            }
            _ => mono,
        };

        info!(
            title = %metadata.title,
            sample_rate = buffer.sample_rate(),
            samples = buffer.len(),
            "track loaded"
        );
        Ok(LoadedTrack { buffer, metadata })
    }
}

/// Title and artist tags, falling back to the file stem
fn extract_metadata(
    format: &mut Box<dyn symphonia::core::formats::FormatReader>,
    path: &Path,
) -> TrackMetadata {
    let mut metadata = TrackMetadata {
        title: path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string(),
        artist: "Unknown".to_string(),
        ..Default::default()
    };

    if let Some(meta) = format.metadata().current() {
        for tag in meta.tags() {
            match tag.std_key {
                Some(symphonia::core::meta::StandardTagKey::TrackTitle) => {
                    metadata.title = tag.value.to_string();
                }
                Some(symphonia::core::meta::StandardTagKey::Artist) => {
                    metadata.artist = tag.value.to_string();
                }
                _ => {}
            }
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_stereo_wav(path: &Path, frames: usize, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let v = ((i % 100) as i16 - 50) * 200;
            writer.write_sample(v).unwrap();
            writer.write_sample(v / 2).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_downmixes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beat.wav");
        write_stereo_wav(&path, 4410, 44100);

        let track = TrackLoader::new().load(&path).unwrap();
        assert_eq!(track.buffer.channels(), 1);
        assert_eq!(track.buffer.sample_rate(), 44100);
        assert_eq!(track.buffer.len(), 4410);
        assert_eq!(track.metadata.source_channels, 2);
        assert_eq!(track.metadata.title, "beat");

        // Frame 0 is (-10000 + -5000) / 2 in 16-bit units
        let expected = (-10000.0 / 32768.0 + -5000.0 / 32768.0) / 2.0;
        assert!((track.buffer.samples()[0] - expected).abs() < 1e-4);
    }

    #[test]
    fn test_load_resamples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beat.wav");
        write_stereo_wav(&path, 4410, 44100);

        let track = TrackLoader::with_sample_rate(22050).load(&path).unwrap();
        assert_eq!(track.buffer.sample_rate(), 22050);
        assert_eq!(track.buffer.len(), 2205);
    }

    #[test]
    fn test_missing_file() {
        let result = TrackLoader::new().load(Path::new("/nonexistent/track.wav"));
        assert!(matches!(result, Err(LoadError::Io(_))));
    }
}
