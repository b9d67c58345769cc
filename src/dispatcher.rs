//! Single-worker task dispatcher
//!
//! Long operations (engine preload, model load, inference) run on one
//! background thread. Each dispatched closure is tagged with a [`RequestId`];
//! its result comes back to the controlling thread as a [`Completion`] over a
//! channel, which the GUI event loop drains. The controlling thread never
//! blocks on the worker and never shares view state with it.

use crate::{
    error::{Failure, Result, StudioError},
    job::ProcessedImage,
    models::ModelId,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, error, info_span, warn};

/// Monotonically increasing id of a dispatched task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Category of a dispatched task
///
/// Staleness is judged per category: a model load never supersedes an
/// inference and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Preload,
    ModelLoad,
    Inference,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preload => write!(f, "preload"),
            Self::ModelLoad => write!(f, "model-load"),
            Self::Inference => write!(f, "inference"),
        }
    }
}

/// Successful result of a background task
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Engine runtime loaded and the default model warmed
    EngineReady(ModelId),
    /// Session for the model is resident in the cache
    ModelLoaded(ModelId),
    /// Inference finished
    Processed(ProcessedImage),
}

/// Result of one background task, delivered to the controlling thread
#[derive(Debug, Clone)]
pub struct Completion {
    pub id: RequestId,
    pub kind: TaskKind,
    pub result: std::result::Result<Outcome, Failure>,
}

type Job = Box<dyn FnOnce() -> Result<Outcome> + Send + 'static>;

struct Envelope {
    id: RequestId,
    kind: TaskKind,
    job: Job,
}

/// Executor with exactly one worker thread
pub struct WorkerDispatcher {
    jobs: async_channel::Sender<Envelope>,
    completions: async_channel::Receiver<Completion>,
    next_id: AtomicU64,
    worker: Option<JoinHandle<()>>,
}

impl WorkerDispatcher {
    /// Spawn the worker thread
    ///
    /// # Errors
    /// - The OS refused to spawn a thread
    pub fn new(name: &str) -> Result<Self> {
        let (jobs, job_rx) = async_channel::unbounded::<Envelope>();
        let (completion_tx, completions) = async_channel::unbounded::<Completion>();

        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(&job_rx, &completion_tx))
            .map_err(|e| StudioError::internal(format!("Failed to spawn worker thread: {e}")))?;

        Ok(Self {
            jobs,
            completions,
            next_id: AtomicU64::new(1),
            worker: Some(worker),
        })
    }

    /// Queue `job` on the worker
    ///
    /// # Errors
    /// - The dispatcher has been shut down
    pub fn dispatch<F>(&self, kind: TaskKind, job: F) -> Result<RequestId>
    where
        F: FnOnce() -> Result<Outcome> + Send + 'static,
    {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.jobs
            .try_send(Envelope {
                id,
                kind,
                job: Box::new(job),
            })
            .map_err(|_| StudioError::internal("Worker dispatcher is shut down"))?;
        debug!(request = %id, kind = %kind, "Dispatched background task");
        Ok(id)
    }

    /// Next completion if one is ready, without blocking
    pub fn try_next(&self) -> Option<Completion> {
        self.completions.try_recv().ok()
    }

    /// Block until the next completion
    ///
    /// Returns `None` once the worker is gone and every completion was drained.
    /// Never call this from a GUI thread.
    pub fn wait_next(&self) -> Option<Completion> {
        self.completions.recv_blocking().ok()
    }

    /// Receiver for event loops that await completions asynchronously
    pub fn completions(&self) -> async_channel::Receiver<Completion> {
        self.completions.clone()
    }

    /// Close the queue and join the worker after it finishes the current task
    pub fn shutdown(&mut self) {
        self.jobs.close();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Worker thread terminated abnormally");
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.jobs.is_closed()
    }
}

impl Drop for WorkerDispatcher {
    fn drop(&mut self) {
        // The worker drains what is already queued, then exits detached
        self.jobs.close();
    }
}

fn worker_loop(
    jobs: &async_channel::Receiver<Envelope>,
    completions: &async_channel::Sender<Completion>,
) {
    while let Ok(Envelope { id, kind, job }) = jobs.recv_blocking() {
        let _span = info_span!("worker_task", request = %id, kind = %kind).entered();

        let result = match catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                warn!(error = %e, "Background task failed");
                Err(Failure::from(&e))
            },
            Err(payload) => {
                let failure = Failure::from_panic(payload.as_ref());
                error!(message = %failure.message, "Background task panicked");
                Err(failure)
            },
        };

        if completions.send_blocking(Completion { id, kind, result }).is_err() {
            debug!("Completion receiver dropped, stopping worker");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::time::Duration;

    fn wait(dispatcher: &WorkerDispatcher) -> Completion {
        dispatcher.wait_next().expect("worker stopped unexpectedly")
    }

    #[test]
    fn test_ids_increase_and_results_arrive_in_order() {
        let dispatcher = WorkerDispatcher::new("test-worker").unwrap();

        let first = dispatcher
            .dispatch(TaskKind::ModelLoad, || Ok(Outcome::ModelLoaded(ModelId::U2Net)))
            .unwrap();
        let second = dispatcher
            .dispatch(TaskKind::ModelLoad, || {
                Ok(Outcome::ModelLoaded(ModelId::IsNetAnime))
            })
            .unwrap();
        assert!(second > first);

        let a = wait(&dispatcher);
        let b = wait(&dispatcher);
        assert_eq!(a.id, first);
        assert_eq!(b.id, second);
        assert!(matches!(b.result, Ok(Outcome::ModelLoaded(ModelId::IsNetAnime))));
    }

    #[test]
    fn test_errors_become_plain_failures() {
        let dispatcher = WorkerDispatcher::new("test-worker").unwrap();
        dispatcher
            .dispatch(TaskKind::Inference, || {
                Err(StudioError::inference("weights missing"))
            })
            .unwrap();

        let completion = wait(&dispatcher);
        let failure = completion.result.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Inference);
        assert_eq!(failure.message, "weights missing");
    }

    #[test]
    fn test_panics_are_contained() {
        let dispatcher = WorkerDispatcher::new("test-worker").unwrap();
        dispatcher
            .dispatch(TaskKind::Inference, || panic!("kaboom"))
            .unwrap();
        dispatcher
            .dispatch(TaskKind::ModelLoad, || Ok(Outcome::ModelLoaded(ModelId::U2Net)))
            .unwrap();

        let failure = wait(&dispatcher).result.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Panic);
        assert_eq!(failure.message, "kaboom");

        // The worker survives the panic
        assert!(wait(&dispatcher).result.is_ok());
    }

    #[test]
    fn test_try_next_does_not_block() {
        let dispatcher = WorkerDispatcher::new("test-worker").unwrap();
        assert!(dispatcher.try_next().is_none());

        dispatcher
            .dispatch(TaskKind::Preload, || {
                std::thread::sleep(Duration::from_millis(20));
                Ok(Outcome::EngineReady(ModelId::U2Net))
            })
            .unwrap();
        assert!(dispatcher.try_next().is_none());
        assert!(wait(&dispatcher).result.is_ok());
    }

    #[test]
    fn test_dispatch_after_shutdown_fails() {
        let mut dispatcher = WorkerDispatcher::new("test-worker").unwrap();
        dispatcher.shutdown();

        assert!(dispatcher.is_shut_down());
        let result = dispatcher.dispatch(TaskKind::Preload, || {
            Ok(Outcome::EngineReady(ModelId::U2Net))
        });
        assert!(matches!(result, Err(StudioError::Internal(_))));
    }
}
