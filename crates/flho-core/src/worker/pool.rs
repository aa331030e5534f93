//! Bounded pool for fire-and-forget background jobs.
//!
//! Jobs go through a bounded queue served by a fixed number of tokio
//! workers. A full queue rejects new jobs instead of growing. Each job runs
//! inside `catch_unwind`, so a panicking job is logged and the worker keeps
//! serving.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_util::task::TaskTracker;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool queue is full")]
    Saturated,

    #[error("worker pool is shut down")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    sender: Arc<RwLock<Option<mpsc::Sender<Job>>>>,
    tracker: TaskTracker,
}

impl WorkerPool {
    /// Spawn `workers` workers sharing a queue of `capacity` pending jobs.
    /// Both are clamped to at least one.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let tracker = TaskTracker::new();

        for worker in 0..workers.max(1) {
            let rx = rx.clone();
            tracker.spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        tracing::error!(worker, panic = %message, "background job panicked");
                    }
                }
                tracing::trace!(worker, "worker stopped");
            });
        }

        Self {
            sender: Arc::new(RwLock::new(Some(tx))),
            tracker,
        }
    }

    /// Queue a job. Fails fast when the queue is full or the pool is closed.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.sender.read().map_err(|_| PoolError::Closed)?;
        let sender = guard.as_ref().ok_or(PoolError::Closed)?;
        sender.try_send(Box::pin(job)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PoolError::Saturated,
            mpsc::error::TrySendError::Closed(_) => PoolError::Closed,
        })
    }

    /// Stop accepting jobs and wait for queued and running ones to finish.
    pub async fn shutdown(&self) {
        if let Ok(mut guard) = self.sender.write() {
            guard.take();
        }
        self.tracker.close();
        self.tracker.wait().await;
        tracing::debug!("worker pool drained");
    }
}
