//! Bounded worker pool with caller-runs overflow.
//!
//! Work goes to a free worker if there is one, otherwise it waits in a
//! bounded queue for a worker. When the queue is full too, the submitting
//! task runs the work itself before submitting anything else, which slows
//! submission down instead of dropping work. `run_all` returns only after
//! every item has completed.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Progress callback: (completed, total)
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// How the submitted work was placed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Started on a free worker immediately
    pub direct: usize,
    /// Waited in the queue for a worker
    pub queued: usize,
    /// Run by the submitter because workers and queue were saturated
    pub caller_runs: usize,
    /// Tasks that panicked and produced no result
    pub failed: usize,
}

/// Results of a `run_all` call, in completion order
#[derive(Debug)]
pub struct PoolRun<T> {
    pub results: Vec<T>,
    pub stats: PoolStats,
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: Arc<Semaphore>,
    queue: Arc<Semaphore>,
    capacity: usize,
    queue_depth: usize,
}

impl WorkerPool {
    /// `workers` is clamped to at least one
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        let capacity = workers.max(1);
        Self {
            workers: Arc::new(Semaphore::new(capacity)),
            queue: Arc::new(Semaphore::new(queue_depth)),
            capacity,
            queue_depth,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Run `task` for every item and wait for all of them.
    ///
    /// A panicking task is counted in `stats.failed` and contributes no
    /// result; it never cancels its siblings.
    pub async fn run_all<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        task: F,
        progress: Option<&ProgressFn>,
    ) -> PoolRun<T>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let total = items.len();
        let mut results = Vec::with_capacity(total);
        let mut stats = PoolStats::default();
        let mut tasks = JoinSet::new();

        let report = |done: usize| {
            if let Some(cb) = progress {
                cb(done, total);
            }
        };

        for item in items {
            if let Ok(permit) = self.workers.clone().try_acquire_owned() {
                stats.direct += 1;
                let work = task(item);
                tasks.spawn(async move {
                    let _permit = permit;
                    work.await
                });
            } else if let Ok(slot) = self.queue.clone().try_acquire_owned() {
                stats.queued += 1;
                let workers = self.workers.clone();
                let work = task(item);
                tasks.spawn(async move {
                    // The semaphore is never closed, so this only waits
                    let _permit = workers.acquire_owned().await.ok();
                    drop(slot);
                    work.await
                });
            } else {
                stats.caller_runs += 1;
                debug!("Worker pool saturated, running task on the submitting task");
                match AssertUnwindSafe(task(item)).catch_unwind().await {
                    Ok(value) => results.push(value),
                    Err(_) => {
                        stats.failed += 1;
                        warn!("Task run by the submitter panicked");
                    }
                }
                report(results.len() + stats.failed);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(value) => {
                    results.push(value);
                    report(results.len() + stats.failed);
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!("Worker task failed: {}", e);
                    report(results.len() + stats.failed);
                }
            }
        }

        debug!(
            "Worker pool finished {} tasks (direct: {}, queued: {}, caller-runs: {}, failed: {})",
            total, stats.direct, stats.queued, stats.caller_runs, stats.failed
        );

        PoolRun { results, stats }
    }
}
