//! The worker pool supervisor
//!
//! Modeled on a multiprocessing pool: items are copied into isolated
//! workers, results come back over a message channel as one of exactly
//! three outcomes (done, failed, interrupted), and the first failure
//! terminates the entire batch.

use crate::error::{JobError, PoolError, Result};
use crate::interrupt::Interrupt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Per-worker initialization hook, run once when a worker starts.
///
/// This is where a caller injects worker-side policy (the original system
/// had workers suppress interactive interrupt signals; here the policy is
/// explicit instead of ambient).
pub type WorkerInit = Arc<dyn Fn() + Send + Sync>;

/// One unit of batch work: an identity key plus the future that does it.
///
/// The key is carried through the result channel so the supervisor can
/// re-associate results with their originating items regardless of
/// completion order.
pub struct WorkItem {
    key: String,
    task: Pin<Box<dyn Future<Output = std::result::Result<Value, JobError>> + Send>>,
}

impl WorkItem {
    pub fn new<F>(key: impl Into<String>, task: F) -> Self
    where
        F: Future<Output = std::result::Result<Value, JobError>> + Send + 'static,
    {
        Self {
            key: key.into(),
            task: Box::pin(task),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem").field("key", &self.key).finish()
    }
}

/// Message a worker sends back to the supervisor, exactly once per item
#[derive(Debug, Clone)]
pub enum WorkerReport {
    /// Normal completion with the item's result payload
    Done { key: String, payload: Value },

    /// The job raised an unexpected error; the batch must die
    Failed {
        key: String,
        class: String,
        trace: String,
    },

    /// The worker observed a cancellation signal
    Interrupted { key: String },
}

/// Bounded pool of task workers with fail-fast batch semantics
pub struct WorkerPool {
    size: usize,
    worker_init: Option<WorkerInit>,
}

impl WorkerPool {
    /// A size of zero must not deadlock; it is treated as one worker.
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            worker_init: None,
        }
    }

    /// Conventional bound for inventory fanout: `min(items, 10)`
    pub fn for_queries(item_count: usize) -> Self {
        Self::new(item_count.min(10))
    }

    pub fn with_worker_init(mut self, init: WorkerInit) -> Self {
        self.worker_init = Some(init);
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Execute a batch, returning per-item results keyed by item identity.
    ///
    /// - An empty batch returns immediately; no workers are spawned.
    /// - On the first `Failed` or `Interrupted` report (or a worker
    ///   panic) every sibling worker is aborted and the batch returns a
    ///   single fatal error with no partial results.
    pub async fn run_batch(
        &self,
        items: Vec<WorkItem>,
        interrupt: &Interrupt,
    ) -> Result<BTreeMap<String, Value>> {
        if items.is_empty() {
            debug!("empty batch, nothing to execute");
            return Ok(BTreeMap::new());
        }

        let expected = items.len();
        debug!(items = expected, workers = self.size, "starting batch");

        let semaphore = Arc::new(Semaphore::new(self.size));
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerReport>();
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(expected);

        for item in items {
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            let init = self.worker_init.clone();
            let interrupt = interrupt.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if let Some(init) = init {
                    init();
                }
                let WorkItem { key, task } = item;
                if interrupt.is_raised() {
                    let _ = tx.send(WorkerReport::Interrupted { key });
                    return;
                }
                let report = match task.await {
                    Ok(payload) => WorkerReport::Done { key, payload },
                    Err(JobError::Interrupted) => WorkerReport::Interrupted { key },
                    Err(JobError::Failed { class, trace }) => {
                        WorkerReport::Failed { key, class, trace }
                    }
                };
                let _ = tx.send(report);
            }));
        }
        drop(tx);

        let mut results = BTreeMap::new();
        let mut received = 0usize;
        while received < expected {
            tokio::select! {
                () = interrupt.raised() => {
                    warn!("caught interrupt, terminating workers");
                    Self::terminate(&handles);
                    return Err(PoolError::BatchInterrupted);
                }
                report = rx.recv() => match report {
                    Some(WorkerReport::Done { key, payload }) => {
                        debug!(%key, "work item completed");
                        results.insert(key, payload);
                        received += 1;
                    }
                    Some(WorkerReport::Failed { key, class, trace }) => {
                        error!(%key, %class, "worker failed, terminating workers");
                        Self::terminate(&handles);
                        return Err(PoolError::BatchFailed { key, class, trace });
                    }
                    Some(WorkerReport::Interrupted { key }) => {
                        warn!(%key, "worker interrupted, terminating workers");
                        Self::terminate(&handles);
                        return Err(PoolError::BatchInterrupted);
                    }
                    // Every sender gone with reports outstanding: a worker
                    // died without reporting, i.e. it panicked.
                    None => {
                        error!("worker exited without reporting, terminating workers");
                        Self::terminate(&handles);
                        return Err(PoolError::BatchFailed {
                            key: String::new(),
                            class: "panic".to_string(),
                            trace: "worker exited without reporting".to_string(),
                        });
                    }
                },
            }
        }

        // Graceful close: all reports are in, wait out the worker tails.
        for handle in handles {
            let _ = handle.await;
        }
        Ok(results)
    }

    fn terminate(handles: &[JoinHandle<()>]) {
        for handle in handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ok_item(key: &str, value: i64) -> WorkItem {
        WorkItem::new(key, async move { Ok(json!(value)) })
    }

    #[tokio::test]
    async fn empty_batch_returns_immediately() {
        let pool = WorkerPool::new(4);
        let results = pool.run_batch(Vec::new(), &Interrupt::new()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn results_are_keyed_by_item_identity() {
        let pool = WorkerPool::new(2);
        let items = vec![ok_item("a", 1), ok_item("b", 2), ok_item("c", 3)];
        let results = pool.run_batch(items, &Interrupt::new()).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results["a"], json!(1));
        assert_eq!(results["b"], json!(2));
        assert_eq!(results["c"], json!(3));
    }

    #[tokio::test]
    async fn zero_size_pool_still_makes_progress() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.size(), 1);
        let items = vec![ok_item("a", 1), ok_item("b", 2)];
        let results = pool.run_batch(items, &Interrupt::new()).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn failed_item_discards_sibling_results() {
        let pool = WorkerPool::new(5);
        let items = vec![
            ok_item("1", 1),
            ok_item("2", 2),
            WorkItem::new("3", async {
                Err(JobError::failed("StubFailure", "provider exploded"))
            }),
            WorkItem::new("4", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(json!(4))
            }),
            ok_item("5", 5),
        ];
        let err = pool
            .run_batch(items, &Interrupt::new())
            .await
            .expect_err("batch must fail");
        match err {
            PoolError::BatchFailed { key, class, .. } => {
                assert_eq!(key, "3");
                assert_eq!(class, "StubFailure");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn interrupt_terminates_the_batch() {
        let pool = WorkerPool::new(2);
        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        let items = vec![
            WorkItem::new("slow", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(json!(()))
            }),
            WorkItem::new("raiser", async move {
                trigger.raise();
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(json!(()))
            }),
        ];
        let err = pool
            .run_batch(items, &interrupt)
            .await
            .expect_err("batch must be interrupted");
        assert!(matches!(err, PoolError::BatchInterrupted));
    }

    #[tokio::test]
    async fn worker_panic_fails_the_batch() {
        let pool = WorkerPool::new(2);
        let items = vec![
            ok_item("fine", 1),
            WorkItem::new("boom", async { panic!("worker crashed") }),
        ];
        let err = pool
            .run_batch(items, &Interrupt::new())
            .await
            .expect_err("panic must fail the batch");
        assert!(matches!(err, PoolError::BatchFailed { class, .. } if class == "panic"));
    }

    #[tokio::test]
    async fn worker_init_runs_per_worker_start() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let pool = WorkerPool::new(2)
            .with_worker_init(Arc::new(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }));
        let items = vec![ok_item("a", 1), ok_item("b", 2), ok_item("c", 3)];
        pool.run_batch(items, &Interrupt::new()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrency_stays_within_the_bound() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut items = Vec::new();
        for i in 0..8 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            items.push(WorkItem::new(format!("job-{i}"), async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(json!(i))
            }));
        }
        let pool = WorkerPool::new(3);
        let results = pool.run_batch(items, &Interrupt::new()).await.unwrap();
        assert_eq!(results.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
