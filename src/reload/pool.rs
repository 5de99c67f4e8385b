//! Bounded pool for blocking load work.

use crate::error::{ReloadError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;

/// Runs blocking closures on tokio's blocking threads, at most `capacity`
/// at a time.
///
/// Each job holds a semaphore permit for as long as its closure runs.
/// [`shutdown`](Self::shutdown) rejects new jobs and waits until every
/// dispatched one has returned.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    closing: AtomicBool,
}

impl WorkerPool {
    /// Pool of `capacity` workers; zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            closing: AtomicBool::new(false),
        }
    }

    /// Maximum number of jobs running at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Workers currently idle.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Run `job` on a worker once one is free.
    ///
    /// # Errors
    ///
    /// [`ReloadError::ShuttingDown`] if the pool is closing, and
    /// [`ReloadError::WorkerFailed`] if the job panicked.
    pub async fn run<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_closing() {
            return Err(ReloadError::ShuttingDown);
        }

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ReloadError::ShuttingDown)?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| ReloadError::WorkerFailed(e.to_string()))
    }

    /// Stop accepting jobs and wait for dispatched ones to finish.
    ///
    /// Jobs already waiting for a worker when shutdown starts still run.
    pub async fn shutdown(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        let all = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        if let Ok(drained) = self.permits.acquire_many(all).await {
            drained.forget();
        }
        self.permits.close();
        tracing::debug!(capacity = self.capacity, "Worker pool drained");
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_value() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.run(|| 21 * 2).await.unwrap(), 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_one() {
        assert_eq!(WorkerPool::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn test_panic_is_worker_failure() {
        let pool = WorkerPool::new(1);
        let result: Result<()> = pool.run(|| panic!("boom")).await;
        assert!(matches!(result, Err(ReloadError::WorkerFailed(_))));
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_capacity_bounds_concurrency() {
        let pool = Arc::new(WorkerPool::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut jobs = Vec::new();
        for _ in 0..6 {
            let pool = Arc::clone(&pool);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            jobs.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for job in jobs {
            job.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_waits_for_in_flight() {
        let pool = Arc::new(WorkerPool::new(2));
        let finished = Arc::new(AtomicBool::new(false));

        let started = Arc::new(tokio::sync::Notify::new());
        let job = {
            let pool = Arc::clone(&pool);
            let finished = Arc::clone(&finished);
            let started = Arc::clone(&started);
            tokio::spawn(async move {
                pool.run(move || {
                    started.notify_one();
                    std::thread::sleep(Duration::from_millis(100));
                    finished.store(true, Ordering::SeqCst);
                })
                .await
            })
        };

        started.notified().await;
        pool.shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(job.await.unwrap().is_ok());

        assert!(matches!(pool.run(|| ()).await, Err(ReloadError::ShuttingDown)));
    }
}
