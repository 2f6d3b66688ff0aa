//! Session controller: owns the working buffer and coordinates the worker,
//! history, playback and saves for one loaded track
//!
//! ```text
//! Idle -> Ready -> Applying -> Ready -> ... -> Closed
//! ```
//!
//! Instructions are dispatched to the [`ProcessingWorker`] and waited on with
//! a bounded timeout, so at most one job is outstanding. One-letter commands
//! are handled synchronously.

use crate::history::{HistoryEntry, HistoryStore};
use crate::worker::{Job, JobInput, JobOutput, ProcessingWorker, WorkerError};
use crossbeam_channel::{bounded, RecvTimeoutError};
use skrew_audio::effects::MIN_TARGET_BPM;
use skrew_audio::{Dsp, EffectEngine, PlaybackEngine, PlaybackError, SampleBuffer};
use skrew_input::{classify, help_text, Action, Control, Effect, Input, Operation};
use skrew_library::{
    Config, ExportError, Exporter, LoadError, SnapshotError, SnapshotRef, SnapshotStore,
    TrackLoader,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to load track: {0}")]
    Load(#[from] LoadError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("processing did not finish within {0:?}")]
    Timeout(Duration),
    #[error("processing failed; see log for details")]
    JobFailed,
    #[error("history is empty")]
    EmptyHistory,
    #[error("session is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Ready,
    Applying,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NoticeLevel::Info => f.write_str(&self.message),
            NoticeLevel::Warning => write!(f, "Warning: {}", self.message),
            NoticeLevel::Error => write!(f, "Error: {}", self.message),
        }
    }
}

/// What the input loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
    /// The user asked to load another file (`l;`)
    LoadRequested,
}

/// Result of handling one line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub notices: Vec<Notice>,
    pub flow: Flow,
}

impl Outcome {
    fn new(notices: Vec<Notice>) -> Self {
        Self {
            notices,
            flow: Flow::Continue,
        }
    }
}

/// Session settings, usually taken from [`Config`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub history_capacity: usize,
    pub job_timeout: Duration,
    pub step_mode: bool,
    pub output_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub max_name_len: usize,
    pub final_gate_db: Option<f32>,
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            history_capacity: config.history_capacity,
            job_timeout: Duration::from_secs(config.job_timeout_secs),
            step_mode: config.step_mode,
            output_dir: config.output_dir.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
            max_name_len: config.max_name_len,
            final_gate_db: config.final_gate_db(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// One loaded track and everything derived from it
pub struct Session {
    state: SessionState,
    working: Arc<SampleBuffer>,
    /// Source file stem, used for output names
    source_name: String,
    history: HistoryStore<SnapshotRef>,
    store: Arc<SnapshotStore>,
    worker: ProcessingWorker,
    playback: PlaybackEngine,
    exporter: Exporter,
    /// Unterminated input waiting for its `;`
    pending: String,
    job_timeout: Duration,
    step_mode: bool,
}

impl Session {
    /// Load `path` and start a session on it
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(
        path: &Path,
        options: SessionOptions,
        dsp: Arc<dyn Dsp>,
        playback: PlaybackEngine,
    ) -> Result<Self, SessionError> {
        let track = TrackLoader::new().load(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("track")
            .to_string();
        let engine = EffectEngine::new(dsp).with_final_gate(options.final_gate_db);
        Self::from_buffer(track.buffer, &name, options, engine, playback)
    }

    /// Start a session on an in-memory buffer
    pub fn from_buffer(
        buffer: SampleBuffer,
        name: &str,
        options: SessionOptions,
        engine: EffectEngine,
        mut playback: PlaybackEngine,
    ) -> Result<Self, SessionError> {
        let store = Arc::new(SnapshotStore::new()?);
        let initial = store.save(&buffer)?;
        let worker = ProcessingWorker::spawn(engine, Arc::clone(&store))?;

        let working = Arc::new(buffer);
        let mut history = HistoryStore::new(options.history_capacity);
        let _ = history.add(initial, Vec::new());
        playback.load(Arc::clone(&working));

        let mut session = Self {
            state: SessionState::Idle,
            working,
            source_name: name.to_string(),
            history,
            store,
            worker,
            playback,
            exporter: Exporter::new(options.output_dir, options.ffmpeg_path, options.max_name_len),
            pending: String::new(),
            job_timeout: options.job_timeout,
            step_mode: options.step_mode,
        };
        session.transition(SessionState::Ready);
        info!(name, samples = session.working.len(), "session ready");
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn working(&self) -> &Arc<SampleBuffer> {
        &self.working
    }

    pub fn history(&self) -> &HistoryStore<SnapshotRef> {
        &self.history
    }

    pub fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Handle one line (or submitted key buffer) of user input
    pub fn handle_input(&mut self, line: &str) -> Outcome {
        if self.state == SessionState::Closed {
            return Outcome {
                notices: vec![Notice::error(SessionError::Closed.to_string())],
                flow: Flow::Quit,
            };
        }

        let text = std::mem::take(&mut self.pending) + line;
        match classify(&text) {
            Input::Empty => Outcome::new(Vec::new()),
            Input::Incomplete(held) => {
                self.pending = held;
                Outcome::new(vec![Notice::info(format!(
                    "Holding '{}' until it ends with ';'",
                    self.pending
                ))])
            }
            Input::Control(control) => self.control(control),
            Input::Instruction(operations) => Outcome::new(self.instruction(operations)),
        }
    }

    /// Run a one-letter command synchronously
    pub fn control(&mut self, control: Control) -> Outcome {
        let mut notices = Vec::new();
        let mut flow = Flow::Continue;
        match control {
            Control::Quit => {
                self.close();
                flow = Flow::Quit;
            }
            Control::Save => match self.save() {
                Ok(saved) => notices.extend(saved),
                Err(e) => notices.push(Notice::error(format!("Error saving files: {e}"))),
            },
            Control::TogglePlayback => match self.playback.toggle() {
                Ok(true) => notices.push(Notice::info("Playback started")),
                Ok(false) => notices.push(Notice::info("Playback paused")),
                Err(e) => notices.push(Notice::error(e.to_string())),
            },
            Control::Undo => {
                self.undo(&mut notices);
                notices.push(Notice::info(self.history.status()));
            }
            Control::Redo => {
                self.redo(&mut notices);
                notices.push(Notice::info(self.history.status()));
            }
            Control::Load => flow = Flow::LoadRequested,
            Control::Help => {
                notices.push(Notice::info(help_text()));
                notices.push(Notice::info(self.history.status()));
            }
        }
        Outcome { notices, flow }
    }

    /// Apply one terminated instruction, clause by clause
    ///
    /// Consecutive effects are batched into one job. Reverts and commands
    /// inside an instruction flush the batch first, so order is preserved.
    fn instruction(&mut self, operations: Vec<Operation>) -> Vec<Notice> {
        let mut notices = Vec::new();
        let mut batch = Vec::new();

        for operation in operations {
            match operation.resolve() {
                Err(e) => notices.push(Notice::error(format!("Skipping '{operation}': {e}"))),
                Ok(Action::Effect(effect)) => {
                    if let Effect::BpmMatch { target_bpm } = effect {
                        if target_bpm < MIN_TARGET_BPM {
                            notices.push(Notice::warning(format!(
                                "bpm target {target_bpm} is below {MIN_TARGET_BPM}, using {MIN_TARGET_BPM}"
                            )));
                        }
                    }
                    batch.push(operation);
                }
                Ok(Action::Revert(steps)) => {
                    self.flush(&mut batch, &mut notices);
                    self.revert(steps, &mut notices);
                }
                Ok(Action::Control(control)) => {
                    self.flush(&mut batch, &mut notices);
                    let outcome = self.control(control);
                    notices.extend(outcome.notices);
                }
            }
        }
        self.flush(&mut batch, &mut notices);
        notices
    }

    fn flush(&mut self, batch: &mut Vec<Operation>, notices: &mut Vec<Notice>) {
        if batch.is_empty() {
            return;
        }
        let operations = std::mem::take(batch);
        if let Err(e) = self.apply(operations, notices) {
            warn!(error = %e, "instruction not applied");
            notices.push(Notice::error(e.to_string()));
        }
    }

    /// Process `operations` and commit the result
    fn apply(&mut self, operations: Vec<Operation>, notices: &mut Vec<Notice>) -> Result<(), SessionError> {
        self.transition(SessionState::Applying);
        let was_playing = self.playback.is_playing();
        if was_playing {
            self.playback.pause();
        }
        let position = self.playback.position();

        let result = if self.step_mode {
            self.run_steps(&operations, was_playing, position)
        } else {
            self.run_batch(operations)
        };
        let committed = result.map(|output| self.commit(output, notices));

        if was_playing {
            if let Err(e) = self.playback.start(Some(position)) {
                notices.push(Notice::error(e.to_string()));
            }
        }
        self.transition(SessionState::Ready);
        committed
    }

    fn commit(&mut self, output: JobOutput, notices: &mut Vec<Notice>) {
        for failure in &output.failures {
            notices.push(Notice::warning(format!(
                "'{}' failed: {}",
                failure.operation, failure.error
            )));
        }

        let snapshot = match output.snapshot {
            Some(snapshot) if !output.applied.is_empty() => snapshot,
            unused => {
                if let Some(snapshot) = unused {
                    self.store.release(&snapshot);
                }
                notices.push(Notice::warning("No operation succeeded; nothing changed"));
                return;
            }
        };

        let dropped = self.history.add(snapshot, output.applied);
        self.release(dropped);
        self.working = output.buffer;
        self.playback.load(Arc::clone(&self.working));
        notices.push(Notice::info(self.history.status()));
    }

    fn run_batch(&mut self, operations: Vec<Operation>) -> Result<JobOutput, SessionError> {
        self.dispatch(
            JobInput::Buffer(Arc::clone(&self.working)),
            operations,
            Some(Arc::clone(&self.working)),
            true,
        )
    }

    /// One sub-job per operation, playing each intermediate result
    fn run_steps(
        &mut self,
        operations: &[Operation],
        was_playing: bool,
        position: usize,
    ) -> Result<JobOutput, SessionError> {
        let reference = Arc::clone(&self.working);
        let mut applied = Vec::new();
        let mut failures = Vec::new();
        let mut last = None;

        for (i, operation) in operations.iter().enumerate() {
            let is_last = i + 1 == operations.len();
            let input = if i == 0 {
                JobInput::Buffer(Arc::clone(&reference))
            } else {
                JobInput::Previous
            };
            let output = self.dispatch(
                input,
                vec![operation.clone()],
                is_last.then(|| Arc::clone(&reference)),
                is_last,
            )?;

            if !is_last && was_playing {
                self.playback.load(Arc::clone(&output.buffer));
                self.playback.start(Some(position))?;
            }
            applied.extend(output.applied.iter().cloned());
            failures.extend(output.failures.iter().cloned());
            last = Some(output);
        }

        if was_playing {
            self.playback.pause();
        }
        let last = last.ok_or(SessionError::JobFailed)?;
        Ok(JobOutput {
            applied,
            failures,
            ..last
        })
    }

    /// Submit one job and wait for it
    fn dispatch(
        &mut self,
        input: JobInput,
        operations: Vec<Operation>,
        reference: Option<Arc<SampleBuffer>>,
        persist: bool,
    ) -> Result<JobOutput, SessionError> {
        let (tx, rx) = bounded(1);
        self.worker.submit(Job {
            input,
            operations,
            reference,
            persist,
            on_complete: Box::new(move |output| {
                let _ = tx.send(output);
            }),
        })?;

        match rx.recv_timeout(self.job_timeout) {
            Ok(output) => Ok(output),
            Err(RecvTimeoutError::Timeout) => Err(SessionError::Timeout(self.job_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(SessionError::JobFailed),
        }
    }

    fn release(&self, entries: Vec<HistoryEntry<SnapshotRef>>) {
        for entry in entries {
            self.store.release(&entry.state);
        }
    }

    /// Make the snapshot at the history cursor the working buffer
    fn restore(&mut self) -> Result<(), SessionError> {
        let snapshot = self
            .history
            .current()
            .map(|entry| entry.state.clone())
            .ok_or(SessionError::EmptyHistory)?;
        let buffer = self.store.load(&snapshot)?;
        self.working = Arc::new(buffer);
        self.playback.load(Arc::clone(&self.working));
        Ok(())
    }

    /// Step back once; false at the oldest state
    fn undo(&mut self, notices: &mut Vec<Notice>) -> bool {
        if self.history.undo().is_none() {
            notices.push(Notice::info("No more undos available."));
            return false;
        }
        if let Err(e) = self.restore() {
            self.history.redo();
            notices.push(Notice::error(e.to_string()));
            return false;
        }
        true
    }

    /// Step forward once; false at the newest state
    fn redo(&mut self, notices: &mut Vec<Notice>) -> bool {
        if self.history.redo().is_none() {
            notices.push(Notice::info("No more redos available."));
            return false;
        }
        if let Err(e) = self.restore() {
            self.history.undo();
            notices.push(Notice::error(e.to_string()));
            return false;
        }
        true
    }

    /// Undo `steps` times (redo for negative), stopping at a boundary
    fn revert(&mut self, steps: i64, notices: &mut Vec<Notice>) {
        for _ in 0..steps.unsigned_abs() {
            let moved = if steps > 0 {
                self.undo(notices)
            } else {
                self.redo(notices)
            };
            if !moved {
                break;
            }
        }
        notices.push(Notice::info(self.history.status()));
    }

    /// Write the working buffer as WAV and MP3
    pub fn save(&self) -> Result<Vec<Notice>, SessionError> {
        let ops: Vec<String> = self
            .history
            .applied_operations()
            .into_iter()
            .map(Operation::compact)
            .collect();
        let files = self.exporter.export(&self.working, &ops, &self.source_name)?;

        let mut notices = vec![Notice::info(format!("Saved WAV as: {}", files.wav.display()))];
        match files.mp3 {
            Some(mp3) => notices.push(Notice::info(format!("Saved MP3 as: {}", mp3.display()))),
            None => notices.push(Notice::warning("MP3 encode failed; only the WAV was written")),
        }
        Ok(notices)
    }

    /// Play the working buffer from the start
    pub fn restart_playback(&mut self) -> Result<(), SessionError> {
        self.playback.reset_position();
        self.playback.start(Some(0))?;
        Ok(())
    }

    /// Stop playback and the worker, release every snapshot
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.playback.pause();
        self.worker.shutdown();
        let entries = self.history.clear();
        self.release(entries);
        self.transition(SessionState::Closed);
        info!("session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
