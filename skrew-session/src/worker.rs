//! Background processing: one thread, one FIFO queue
//!
//! Jobs run strictly in submission order. A job that fails is logged and
//! dropped without calling its completion handler; the handler's captured
//! state is dropped with it, which is how waiters observe the failure.

use crossbeam_channel::{unbounded, Sender};
use skrew_audio::{EffectEngine, EffectFailure, SampleBuffer};
use skrew_input::Operation;
use skrew_library::{SnapshotError, SnapshotRef, SnapshotStore};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to start worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("worker has stopped")]
    Stopped,
    #[error("job refers to a previous output but none exists")]
    NoPreviousOutput,
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Where a job's input comes from
pub enum JobInput {
    Buffer(Arc<SampleBuffer>),
    /// Output of the last job that completed on this worker
    Previous,
}

pub type Completion = Box<dyn FnOnce(JobOutput) + Send>;

/// One unit of work
pub struct Job {
    pub input: JobInput,
    pub operations: Vec<Operation>,
    /// Anchor tone and level to this buffer after the operations
    pub reference: Option<Arc<SampleBuffer>>,
    /// Write the result to the snapshot store
    pub persist: bool,
    pub on_complete: Completion,
}

/// Result handed to a job's completion handler
#[derive(Debug)]
pub struct JobOutput {
    pub buffer: Arc<SampleBuffer>,
    pub snapshot: Option<SnapshotRef>,
    pub applied: Vec<Operation>,
    pub failures: Vec<EffectFailure>,
}

/// Handle to the worker thread; dropping it drains the queue and joins
pub struct ProcessingWorker {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl ProcessingWorker {
    pub fn spawn(engine: EffectEngine, store: Arc<SnapshotStore>) -> Result<Self, WorkerError> {
        let (sender, receiver) = unbounded::<Job>();

        let handle = thread::Builder::new()
            .name("skrew-worker".into())
            .spawn(move || {
                let mut last: Option<Arc<SampleBuffer>> = None;
                for (seq, job) in receiver.iter().enumerate() {
                    let Job {
                        input,
                        operations,
                        reference,
                        persist,
                        on_complete,
                    } = job;
                    debug!(seq, operations = operations.len(), "job started");

                    match run(&engine, &store, input, &operations, reference, persist, &last) {
                        Ok(output) => {
                            last = Some(Arc::clone(&output.buffer));
                            debug!(seq, applied = output.applied.len(), "job finished");
                            on_complete(output);
                        }
                        Err(e) => error!(seq, error = %e, "job dropped"),
                    }
                }
                debug!("worker queue closed");
            })
            .map_err(WorkerError::Spawn)?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue a job behind everything already submitted
    pub fn submit(&self, job: Job) -> Result<(), WorkerError> {
        self.sender
            .as_ref()
            .ok_or(WorkerError::Stopped)?
            .send(job)
            .map_err(|_| WorkerError::Stopped)
    }

    /// Stop accepting jobs, finish the queued ones and join the thread
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

impl Drop for ProcessingWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    engine: &EffectEngine,
    store: &SnapshotStore,
    input: JobInput,
    operations: &[Operation],
    reference: Option<Arc<SampleBuffer>>,
    persist: bool,
    last: &Option<Arc<SampleBuffer>>,
) -> Result<JobOutput, WorkerError> {
    let input = match input {
        JobInput::Buffer(buffer) => buffer,
        JobInput::Previous => last.clone().ok_or(WorkerError::NoPreviousOutput)?,
    };

    let report = engine.apply_chain(&input, operations);
    let buffer = match reference {
        Some(reference) => engine.finish(&report.buffer, &reference),
        None => report.buffer,
    };
    let snapshot = if persist {
        Some(store.save(&buffer)?)
    } else {
        None
    };

    Ok(JobOutput {
        buffer: Arc::new(buffer),
        snapshot,
        applied: report.applied,
        failures: report.failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use skrew_input::parse;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(30);

    fn worker() -> (ProcessingWorker, Arc<SnapshotStore>) {
        let store = Arc::new(SnapshotStore::new().unwrap());
        let worker = ProcessingWorker::spawn(EffectEngine::native(), Arc::clone(&store)).unwrap();
        (worker, store)
    }

    fn job(input: JobInput, ops: &str, persist: bool, tx: Sender<JobOutput>) -> Job {
        Job {
            input,
            operations: parse(ops),
            reference: None,
            persist,
            on_complete: Box::new(move |out| {
                let _ = tx.send(out);
            }),
        }
    }

    fn buffer() -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::mono(vec![0.1, 0.2, 0.3, 0.4], 8000))
    }

    #[test]
    fn test_jobs_run_in_order() {
        let (worker, _store) = worker();
        let (tx, rx) = bounded(4);
        worker
            .submit(job(JobInput::Buffer(buffer()), "copy:1:3;", false, tx.clone()))
            .unwrap();
        worker
            .submit(job(JobInput::Previous, "copy:0:1;", false, tx.clone()))
            .unwrap();
        worker
            .submit(job(JobInput::Previous, "copy:0:4;", false, tx))
            .unwrap();

        let first = rx.recv_timeout(WAIT).unwrap();
        let second = rx.recv_timeout(WAIT).unwrap();
        let third = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(first.buffer.samples(), &[0.1, 0.2, 0.2, 0.2]);
        assert_eq!(second.buffer.samples(), &[0.1, 0.2, 0.2, 0.2]);
        assert_eq!(third.buffer.samples(), &[0.1, 0.1, 0.1, 0.1]);
    }

    #[test]
    fn test_persisted_output_matches_snapshot() {
        let (worker, store) = worker();
        let (tx, rx) = bounded(1);
        worker
            .submit(job(JobInput::Buffer(buffer()), "copy:2:2;", true, tx))
            .unwrap();
        let out = rx.recv_timeout(WAIT).unwrap();
        let snapshot = out.snapshot.unwrap();
        assert_eq!(store.load(&snapshot).unwrap(), *out.buffer);
        assert_eq!(out.applied.len(), 1);
    }

    #[test]
    fn test_failed_job_is_dropped() {
        let (worker, _store) = worker();
        let (tx, rx) = bounded(1);
        // No job has completed yet, so there is no previous output
        worker.submit(job(JobInput::Previous, "p:1;", false, tx)).unwrap();
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn test_effect_failures_are_reported_not_fatal() {
        let (worker, _store) = worker();
        let (tx, rx) = bounded(1);
        worker
            .submit(job(JobInput::Buffer(buffer()), "copy:9:1;copy:0:1;", false, tx))
            .unwrap();
        let out = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.applied.len(), 1);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let (mut worker, _store) = worker();
        worker.shutdown();
        let (tx, _rx) = bounded(1);
        assert!(matches!(
            worker.submit(job(JobInput::Buffer(buffer()), "p:1;", false, tx)),
            Err(WorkerError::Stopped)
        ));
    }
}
