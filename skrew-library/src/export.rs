//! Saving the working buffer as WAV plus an MP3 encode

use crate::naming::output_name;
use chrono::Local;
use skrew_audio::SampleBuffer;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}

/// Files written by one save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub wav: PathBuf,
    /// Absent when the encoder is missing or failed
    pub mp3: Option<PathBuf>,
}

/// Writes saves into one output directory
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    ffmpeg_path: PathBuf,
    max_name_len: usize,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>, ffmpeg_path: impl Into<PathBuf>, max_name_len: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            ffmpeg_path: ffmpeg_path.into(),
            max_name_len,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save `buffer` under a name built from `ops` and `base`
    pub fn export(&self, buffer: &SampleBuffer, ops: &[String], base: &str) -> Result<ExportedFiles, ExportError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| ExportError::OutputDir {
            path: self.output_dir.clone(),
            source,
        })?;

        let stem = output_name(ops, Local::now(), base, self.max_name_len);
        let wav = self.output_dir.join(format!("{stem}.wav"));
        write_wav(&wav, buffer)?;
        info!(path = %wav.display(), "saved wav");

        let mp3 = self.output_dir.join(format!("{stem}.mp3"));
        let mp3 = match self.encode_mp3(&wav, &mp3) {
            Ok(()) => {
                info!(path = %mp3.display(), "saved mp3");
                Some(mp3)
            }
            Err(reason) => {
                warn!(%reason, "mp3 encode skipped");
                None
            }
        };

        Ok(ExportedFiles { wav, mp3 })
    }

    fn encode_mp3(&self, wav: &Path, mp3: &Path) -> Result<(), String> {
        let output = Command::new(&self.ffmpeg_path)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(wav)
            .args(["-codec:a", "libmp3lame", "-qscale:a", "2"])
            .arg(mp3)
            .output()
            .map_err(|e| format!("{}: {e}", self.ffmpeg_path.display()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }
}

/// 16-bit PCM WAV, samples clipped to [-1, 1]
pub fn write_wav(path: &Path, buffer: &SampleBuffer) -> Result<(), ExportError> {
    let wav_err = |source| ExportError::Wav {
        path: path.to_path_buf(),
        source,
    };
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
    for &sample in buffer.samples() {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(value).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)
}
