//! Persisted copies of working buffers backing the undo history
//!
//! Each snapshot is a 32-bit float WAV inside a private temporary directory
//! that is removed when the store is dropped.

use skrew_audio::SampleBuffer;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("cannot create working directory: {0}")]
    WorkDir(std::io::Error),
    #[error("snapshot {id}: {source}")]
    Wav {
        id: u64,
        #[source]
        source: hound::Error,
    },
}

/// Handle to one stored snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    pub id: u64,
    pub path: PathBuf,
}

/// Temporary-directory store of buffer snapshots
#[derive(Debug)]
pub struct SnapshotStore {
    dir: TempDir,
    next_id: AtomicU64,
}

impl SnapshotStore {
    /// Create the working directory
    pub fn new() -> Result<Self, SnapshotError> {
        let dir = tempfile::Builder::new()
            .prefix("skrew-")
            .tempdir()
            .map_err(SnapshotError::WorkDir)?;
        debug!(dir = %dir.path().display(), "snapshot store created");
        Ok(Self {
            dir,
            next_id: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Write `buffer` to a new snapshot
    pub fn save(&self, buffer: &SampleBuffer) -> Result<SnapshotRef, SnapshotError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.path().join(format!("state_{id:05}.wav"));
        let wav = |source| SnapshotError::Wav { id, source };

        let spec = hound::WavSpec {
            channels: buffer.channels(),
            sample_rate: buffer.sample_rate(),
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).map_err(wav)?;
        for &sample in buffer.samples() {
            writer.write_sample(sample).map_err(wav)?;
        }
        writer.finalize().map_err(wav)?;

        Ok(SnapshotRef { id, path })
    }

    /// Read a snapshot back, bit-exact
    pub fn load(&self, snapshot: &SnapshotRef) -> Result<SampleBuffer, SnapshotError> {
        let wav = |source| SnapshotError::Wav {
            id: snapshot.id,
            source,
        };
        let mut reader = hound::WavReader::open(&snapshot.path).map_err(wav)?;
        let spec = reader.spec();
        let samples = reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(wav)?;
        Ok(SampleBuffer::new(samples, spec.channels, spec.sample_rate))
    }

    /// Delete a snapshot's file; missing files are ignored
    pub fn release(&self, snapshot: &SnapshotRef) {
        match fs::remove_file(&snapshot.path) {
            Ok(()) => debug!(id = snapshot.id, "snapshot released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(id = snapshot.id, error = %e, "failed to release snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_is_exact() {
        let store = SnapshotStore::new().unwrap();
        let buffer = SampleBuffer::mono(vec![0.1, -0.333_333, 1.5, f32::MIN_POSITIVE], 44100);
        let snapshot = store.save(&buffer).unwrap();
        assert!(snapshot.path.starts_with(store.dir()));
        assert_eq!(store.load(&snapshot).unwrap(), buffer);
    }

    #[test]
    fn test_ids_are_unique() {
        let store = SnapshotStore::new().unwrap();
        let buffer = SampleBuffer::mono(vec![0.0; 4], 8000);
        let a = store.save(&buffer).unwrap();
        let b = store.save(&buffer).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.path, b.path);
    }

    #[test]
    fn test_release_removes_file() {
        let store = SnapshotStore::new().unwrap();
        let snapshot = store.save(&SampleBuffer::mono(vec![0.0; 4], 8000)).unwrap();
        store.release(&snapshot);
        assert!(!snapshot.path.exists());
        assert!(store.load(&snapshot).is_err());
        // Releasing twice is harmless
        store.release(&snapshot);
    }

    #[test]
    fn test_directory_removed_on_drop() {
        let store = SnapshotStore::new().unwrap();
        let dir = store.dir().to_path_buf();
        store.save(&SampleBuffer::mono(vec![0.0; 4], 8000)).unwrap();
        drop(store);
        assert!(!dir.exists());
    }
}
