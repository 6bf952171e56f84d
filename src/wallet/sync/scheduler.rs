//! Two-lane scheduler for network operations.
//!
//! Every network operation the engine performs is submitted to one of two
//! lanes. The sequential lane has concurrency one and completes operations in
//! submission order; it carries anything whose correctness depends on an
//! earlier operation finishing first (sign-then-broadcast chains, any
//! state-mutating chain call). The concurrent lane runs independent read
//! fetches with bounded parallelism and no ordering guarantee.
//!
//! Failures are returned as values to the submitter; the scheduler itself
//! never retries and never panics across the lane boundary.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Default width of the concurrent lane.
pub const DEFAULT_CONCURRENT_LIMIT: usize = 8;

/// Runs operations on a sequential lane or a bounded concurrent lane.
///
/// Cloning shares both lanes.
#[derive(Clone)]
pub struct OperationScheduler {
    sequential_lane: Arc<Mutex<()>>,
    concurrent_lane: Arc<Semaphore>,
}

impl OperationScheduler {
    pub fn new(concurrent_limit: usize) -> Self {
        Self {
            sequential_lane: Arc::new(Mutex::new(())),
            // Tokio's mutex and semaphore queue waiters fairly, which is what
            // gives the sequential lane its submission-order guarantee.
            concurrent_lane: Arc::new(Semaphore::new(concurrent_limit.max(1))),
        }
    }

    /// Run an operation on the sequential lane: concurrency one, FIFO.
    pub async fn sequential<F, T>(&self, operation: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.sequential_lane.lock().await;
        operation.await
    }

    /// Run an operation on the concurrent lane: bounded parallelism, no
    /// ordering guarantee.
    pub async fn concurrent<F, T>(&self, operation: F) -> T
    where
        F: Future<Output = T>,
    {
        let _permit = self
            .concurrent_lane
            .acquire()
            .await
            .expect("concurrent lane semaphore closed");
        operation.await
    }
}

impl Default for OperationScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn sequential_lane_completes_in_submission_order() {
        let scheduler = OperationScheduler::new(4);
        let completed: Arc<StdMutex<Vec<&'static str>>> = Arc::new(StdMutex::new(Vec::new()));

        // A is slowest, C is fastest; completion order must still be A, B, C.
        let mut handles = Vec::new();
        for (name, latency_ms) in [("a", 100u64), ("b", 5), ("c", 1)] {
            let scheduler = scheduler.clone();
            let completed = completed.clone();
            handles.push(tokio::spawn(async move {
                scheduler
                    .sequential(async move {
                        tokio::time::sleep(Duration::from_millis(latency_ms)).await;
                        completed.lock().unwrap().push(name);
                    })
                    .await;
            }));
            // Stagger submissions so queueing order is deterministic.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        join_all(handles).await;

        assert_eq!(*completed.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn concurrent_lane_respects_its_bound() {
        let scheduler = OperationScheduler::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..10).map(|_| {
            let scheduler = scheduler.clone();
            let running = running.clone();
            let peak = peak.clone();
            async move {
                scheduler
                    .concurrent(async {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }
        });
        join_all(tasks).await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn fan_out_join_fires_exactly_once_for_any_size() {
        let scheduler = OperationScheduler::new(3);

        for n in [0usize, 1, 5, 100] {
            let join_count = Arc::new(AtomicUsize::new(0));

            let fetches = (0..n).map(|i| {
                let scheduler = scheduler.clone();
                async move { scheduler.concurrent(async move { i }).await }
            });
            let results = join_all(fetches).await;
            join_count.fetch_add(1, Ordering::SeqCst);

            assert_eq!(results.len(), n, "union size for n = {}", n);
            assert_eq!(join_count.load(Ordering::SeqCst), 1, "join fired once for n = {}", n);
        }
    }
}
