//! Session orchestration: edit history, the background worker and the
//! controller that ties them to playback and export

pub mod history;
pub mod session;
pub mod worker;

pub use history::{HistoryEntry, HistoryStore};
pub use session::{
    Flow, Notice, NoticeLevel, Outcome, Session, SessionError, SessionOptions, SessionState,
};
pub use worker::{Completion, Job, JobInput, JobOutput, ProcessingWorker, WorkerError};
