use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error};

use crate::config::DEFAULT_MAX_WORKERS;
use crate::domain::QueryOutcome;
use crate::metrics;

use super::runner::{run_task, QueryTask};

/// Runs independent statements on a bounded pool of tokio tasks. Every
/// submitted task yields exactly one outcome, in completion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrentExecutor {
    max_workers: usize,
    batch_size: Option<usize>,
}

impl Default for ConcurrentExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl ConcurrentExecutor {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            batch_size: None,
        }
    }

    /// Shuffles tasks and runs them in sequential batches of `batch_size`.
    pub fn with_batch_size(mut self, batch_size: Option<usize>) -> Self {
        self.batch_size = batch_size.filter(|size| *size > 0);
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub async fn run(&self, mut tasks: Vec<QueryTask>) -> Vec<QueryOutcome> {
        let Some(batch_size) = self.batch_size else {
            return self.run_pool(tasks).await;
        };

        tasks.shuffle(&mut StdRng::from_entropy());
        let batch_count = tasks.len().div_ceil(batch_size);
        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut remaining = tasks.into_iter();
        for batch_index in 0..batch_count {
            let batch: Vec<QueryTask> = remaining.by_ref().take(batch_size).collect();
            debug!(batch = batch_index + 1, of = batch_count, size = batch.len(), "Running batch");
            outcomes.extend(self.run_pool(batch).await);
        }
        outcomes
    }

    async fn run_pool(&self, tasks: Vec<QueryTask>) -> Vec<QueryOutcome> {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let in_flight = InFlight::default();
        let (tx, mut rx) = mpsc::channel::<QueryOutcome>(total);
        let mut pending: Vec<String> = tasks.iter().map(|t| t.name.clone()).collect();

        for task in tasks {
            let semaphore = Arc::clone(&semaphore);
            let in_flight = in_flight.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let name = task.name.clone();
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let _running = in_flight.enter();
                        run_task(task).await
                    }
                    Err(e) => QueryOutcome::failure(&name, format!("worker pool closed: {}", e)),
                };
                if tx.send(outcome).await.is_err() {
                    error!(query = %name, "Failed to send query outcome - receiver dropped");
                }
            });
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = rx.recv().await {
            if let Some(pos) = pending.iter().position(|n| *n == outcome.query_name) {
                pending.swap_remove(pos);
            }
            outcomes.push(outcome);
        }

        // Workers that died without reporting still owe an outcome.
        for name in pending {
            error!(query = %name, "Worker exited without reporting an outcome");
            outcomes.push(QueryOutcome::failure(name, "worker exited without reporting"));
        }
        outcomes
    }
}

/// Number of workers currently holding a permit, mirrored into the
/// in-flight gauge. Tasks still waiting for a permit are not counted.
#[derive(Debug, Clone, Default)]
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(&self) -> InFlightGuard {
        let running = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_in_flight_queries(running);
        InFlightGuard(Arc::clone(&self.0))
    }

    #[cfg(test)]
    fn current(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Leaves the in-flight count on drop, including when the worker panics.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let running = self.0.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_in_flight_queries(running);
    }
}
