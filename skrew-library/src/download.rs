//! Fetching audio from remote video URLs with an external downloader

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("cannot create download directory: {0}")]
    Dir(#[from] std::io::Error),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("download failed: {0}")]
    Failed(String),
    #[error("downloader reported no output file")]
    NoOutput,
}

/// True for `http://` and `https://` arguments
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Runs `yt-dlp`-compatible downloaders, extracting WAV audio
#[derive(Debug, Clone)]
pub struct Downloader {
    program: PathBuf,
    dir: PathBuf,
}

impl Downloader {
    pub fn new(program: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dir: dir.into(),
        }
    }

    /// Download `url` and return the extracted audio file
    #[instrument(skip(self))]
    pub fn fetch(&self, url: &str) -> Result<PathBuf, DownloadError> {
        fs::create_dir_all(&self.dir)?;
        let template = self.dir.join("%(title)s.%(ext)s");

        let output = Command::new(&self.program)
            .args(["-x", "--audio-format", "wav", "--no-playlist", "--print", "after_move:filepath", "-o"])
            .arg(&template)
            .arg(url)
            .output()
            .map_err(|source| DownloadError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(DownloadError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let path = downloaded_path(&String::from_utf8_lossy(&output.stdout))
            .ok_or(DownloadError::NoOutput)?;
        info!(path = %path.display(), "downloaded");
        Ok(path)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Last non-empty line of the downloader's stdout
fn downloaded_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_url("http://example.com/a"));
        assert!(!is_url("song.mp3"));
        assert!(!is_url("/music/https.wav"));
    }

    #[test]
    fn test_downloaded_path() {
        let stdout = "\n/tmp/downloads/My Song.wav\n\n";
        assert_eq!(
            downloaded_path(stdout),
            Some(PathBuf::from("/tmp/downloads/My Song.wav"))
        );
        assert_eq!(downloaded_path("  \n"), None);
    }

    #[test]
    fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new("/nonexistent/yt-dlp", dir.path());
        assert!(matches!(
            downloader.fetch("https://example.com/v"),
            Err(DownloadError::Spawn { .. })
        ));
    }
}
