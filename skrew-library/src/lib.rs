//! Track I/O for Skrew - loading, snapshots, export, config

mod config;
mod download;
mod export;
mod loader;
mod naming;
mod snapshot;

pub use config::Config;
pub use download::{is_url, DownloadError, Downloader};
pub use export::{write_wav, ExportError, ExportedFiles, Exporter};
pub use loader::{LoadError, LoadedTrack, TrackLoader, TrackMetadata};
pub use naming::{output_name, sanitize};
pub use snapshot::{SnapshotError, SnapshotRef, SnapshotStore};
