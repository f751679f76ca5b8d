//! Bounded worker pool for sync passes
//!
//! Each sync pass submits one task per entry. At most `workers` tasks run at
//! once; submission waits for a free permit, so the number of spawned tasks
//! never outruns the pool.
//!
//! ## Retry Logic
//!
//! Retryable failures (backend and stat errors) are retried with exponential
//! backoff: `base_delay`, `2 * base_delay`, `4 * base_delay`, ... up to
//! `retries` extra attempts. A task that still fails marks the pool as
//! aborted; tasks already running finish, further submissions are skipped,
//! and [`WorkerPool::join`] returns the first error.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::SyncError;

/// Retry settings applied to every pool task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure
    pub retries: u32,
    /// Delay before the first retry; doubled for each following one
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries
    pub const NONE: RetryPolicy = RetryPolicy {
        retries: 0,
        base_delay: Duration::ZERO,
    };

    /// Backoff before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Executes an async operation, retrying retryable failures with backoff
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    f: F,
) -> Result<T, SyncError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt, "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if attempt < policy.retries && err.is_retryable() => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Task failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Semaphore-bounded set of sync tasks
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<Result<(), SyncError>>,
    retry: RetryPolicy,
    aborted: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Creates a pool running at most `workers` tasks at once (minimum one)
    pub fn new(workers: usize, retry: RetryPolicy) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            tasks: JoinSet::new(),
            retry,
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns true once a task has failed for good
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Number of tasks that may start right now
    pub fn available_workers(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free worker and spawns `task` on it.
    ///
    /// `task` is a factory so the pool can rebuild the future for retries.
    /// Returns `false` without spawning if the pool has been aborted.
    pub async fn submit<F, Fut>(&mut self, operation_name: &'static str, task: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        if self.is_aborted() {
            return false;
        }

        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return false,
        };

        // A task may have failed while we waited for the permit
        if self.is_aborted() {
            return false;
        }

        let retry = self.retry;
        let aborted = Arc::clone(&self.aborted);
        self.tasks.spawn(async move {
            let _permit = permit;
            let result = with_retry(operation_name, retry, task).await;
            if result.is_err() {
                aborted.store(true, Ordering::Release);
            }
            result
        });
        true
    }

    /// Waits for every spawned task and returns the first failure, if any.
    pub async fn join(mut self) -> Result<(), SyncError> {
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined.map_err(|e| SyncError::TaskAborted(e.to_string()));
            if let Err(err) = outcome.and_then(|result| result) {
                warn!(error = %err, "Worker task failed");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
