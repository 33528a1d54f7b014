//! Bounded worker pool for database calls.
//!
//! Driver calls are synchronous and must never run on a hosting thread, so
//! every one of them is pushed to a blocking worker. Admission is bounded:
//! beyond `max_concurrent` running calls plus `queue_depth` waiting ones the
//! pool refuses immediately with [`GatewayError::Overloaded`] rather than
//! queueing without limit. A call that holds a worker longer than the
//! configured ceiling aborts the wait with [`GatewayError::Timeout`].

use log::error;
use sqlgate_commons::{GatewayError, GatewayResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    max_wait: Duration,
}

impl WorkerPool {
    pub fn new(max_concurrent: usize, queue_depth: usize, max_wait: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent + queue_depth)),
            max_wait,
        }
    }

    /// Admission ceiling per statement, for callers driving their own wait.
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Reserve a slot without running anything. Used by the streaming path,
    /// which owns its worker for the lifetime of the response body.
    pub fn admit(&self) -> GatewayResult<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| GatewayError::Overloaded("all database workers are busy".to_string()))
    }

    /// Run a synchronous database call on a blocking worker, bounded by the
    /// pool's admission and time limits.
    pub async fn run<T, F>(&self, call: F) -> GatewayResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> GatewayResult<T> + Send + 'static,
    {
        let permit = self.admit()?;
        // The blocking call cannot be cancelled, so the permit must travel
        // with it: a timed-out call still occupies its slot until it
        // actually returns.
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            call()
        });
        match tokio::time::timeout(self.max_wait, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!(target: "sqlgate::workers", "worker task failed: {join_error}");
                Err(GatewayError::Internal(
                    "statement execution aborted".to_string(),
                ))
            }
            Err(_elapsed) => Err(GatewayError::Timeout(format!(
                "statement exceeded the {}s execution ceiling",
                self.max_wait.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_result() {
        let pool = WorkerPool::new(2, 2, Duration::from_secs(5));
        let n = pool.run(|| Ok(41 + 1)).await.unwrap();
        assert_eq!(n, 42);
    }

    #[tokio::test]
    async fn test_run_propagates_call_errors() {
        let pool = WorkerPool::new(2, 2, Duration::from_secs(5));
        let err = pool
            .run::<(), _>(|| Err(GatewayError::Parameter("bad".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Parameter(_)));
    }

    #[tokio::test]
    async fn test_full_pool_refuses_with_overloaded() {
        let pool = WorkerPool::new(1, 0, Duration::from_secs(5));
        let held = pool.admit().unwrap();
        let err = pool.run(|| Ok(())).await.unwrap_err();
        assert!(matches!(err, GatewayError::Overloaded(_)));
        drop(held);
        pool.run(|| Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let pool = WorkerPool::new(1, 0, Duration::from_millis(20));
        let err = pool
            .run(|| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_timed_out_call_keeps_its_slot_until_it_finishes() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let pool = WorkerPool::new(1, 0, Duration::from_millis(20));
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let err = pool
            .run(move || {
                std::thread::sleep(Duration::from_millis(300));
                flag.store(false, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));

        // The timed-out call is still on its worker; its slot is not free.
        assert!(running.load(Ordering::SeqCst));
        let err = pool.run(|| Ok(())).await.unwrap_err();
        assert!(matches!(err, GatewayError::Overloaded(_)));

        // Once the call actually returns, admission recovers.
        tokio::time::sleep(Duration::from_millis(400)).await;
        pool.run(|| Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_panic_reported_as_internal() {
        let pool = WorkerPool::new(1, 0, Duration::from_secs(5));
        let err = pool.run::<(), _>(|| panic!("boom")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Internal(_)));
    }
}
