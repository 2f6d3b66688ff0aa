//! Simple configuration persistence for Skrew
//!
//! Stores session and output preferences as `key=value` lines.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum undo history entries
    pub history_capacity: usize,
    /// Where saves are written
    pub output_dir: PathBuf,
    /// MP3 encoder binary
    pub ffmpeg_path: PathBuf,
    /// URL downloader binary
    pub downloader_path: PathBuf,
    /// Where downloaded audio lands
    pub download_dir: PathBuf,
    /// Playback block size in frames
    pub block_size: usize,
    /// Bounded wait for one processing job
    pub job_timeout_secs: u64,
    /// Apply instructions one operation per job, updating playback in between
    pub step_mode: bool,
    /// Threshold for the optional final spectral gate
    pub spectral_gate_floor_db: f32,
    /// Run the spectral gate before tone/level matching
    pub final_gate: bool,
    /// Bound on saved file names, before the extension
    pub max_name_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            output_dir: PathBuf::from("processed"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            downloader_path: PathBuf::from("yt-dlp"),
            download_dir: PathBuf::from("downloads"),
            block_size: 2048,
            job_timeout_secs: 600,
            step_mode: false,
            spectral_gate_floor_db: -50.0,
            final_gate: false,
            max_name_len: 200,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to the default location
    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.serialize();
        fs::write(path, content)
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skrew")
            .join("config.txt")
    }

    /// Final gate threshold when enabled
    pub fn final_gate_db(&self) -> Option<f32> {
        self.final_gate.then_some(self.spectral_gate_floor_db)
    }

    /// Parse config from simple key=value format
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                match key {
                    "history_capacity" => set(&mut config.history_capacity, key, value),
                    "output_dir" => set_path(&mut config.output_dir, value),
                    "ffmpeg_path" => set_path(&mut config.ffmpeg_path, value),
                    "downloader_path" => set_path(&mut config.downloader_path, value),
                    "download_dir" => set_path(&mut config.download_dir, value),
                    "block_size" => set(&mut config.block_size, key, value),
                    "job_timeout_secs" => set(&mut config.job_timeout_secs, key, value),
                    "step_mode" => set(&mut config.step_mode, key, value),
                    "spectral_gate_floor_db" => {
                        set(&mut config.spectral_gate_floor_db, key, value)
                    }
                    "final_gate" => set(&mut config.final_gate, key, value),
                    "max_name_len" => set(&mut config.max_name_len, key, value),
                    _ => {} // Ignore unknown keys
                }
            }
        }

        config.history_capacity = config.history_capacity.max(1);
        config.block_size = config.block_size.max(1);
        config
    }

    /// Serialize config to simple key=value format
    pub fn serialize(&self) -> String {
        [
            "# Skrew Configuration".to_string(),
            format!("history_capacity={}", self.history_capacity),
            format!("output_dir={}", self.output_dir.display()),
            format!("ffmpeg_path={}", self.ffmpeg_path.display()),
            format!("downloader_path={}", self.downloader_path.display()),
            format!("download_dir={}", self.download_dir.display()),
            format!("block_size={}", self.block_size),
            format!("job_timeout_secs={}", self.job_timeout_secs),
            format!("step_mode={}", self.step_mode),
            format!("spectral_gate_floor_db={}", self.spectral_gate_floor_db),
            format!("final_gate={}", self.final_gate),
            format!("max_name_len={}", self.max_name_len),
        ]
        .join("\n")
    }
}

/// Malformed values keep the default
fn set<T: FromStr>(slot: &mut T, key: &str, value: &str) {
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value, "ignoring malformed config value"),
    }
}

fn set_path(slot: &mut PathBuf, value: &str) {
    if !value.is_empty() {
        *slot = PathBuf::from(value);
    }
}
