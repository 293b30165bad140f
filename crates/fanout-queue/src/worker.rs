//! Worker pool and exactly-once finalization.
//!
//! `run_batch` fans N payloads out to a bounded pool of tokio tasks. Each
//! settled job goes through the atomic record-outcome step; whichever
//! worker's call wins the completion lock runs the finalizer, then flips
//! the shared done flag so the rest of the pool drains and exits.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::batch::{BatchKey, BatchStore, JobOutcome};
use crate::error::{QueueError, QueueResult};
use crate::queue::{Job, JobQueue};

/// How a handler reports a failed attempt.
#[derive(Debug, Clone)]
pub enum JobError {
    /// Worth retrying (rate limits, network). Retried within budget.
    Transient(String),
    /// Retrying cannot help (project renamed, not found). Recorded as a
    /// failed result immediately.
    Permanent(String),
}

/// Retry budget for one job.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Redeliveries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt.
    pub backoff_base: Duration,
    /// Per-attempt wall-clock cap.
    pub job_timeout: Duration,
    /// Total wall-clock cap across all attempts of one job.
    pub total_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            job_timeout: Duration::from_secs(600),
            total_timeout: Duration::from_secs(3 * 60 * 60),
        }
    }
}

/// Pool-wide configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// In-flight lease; an un-acked job older than this is considered
    /// stalled (worker crash model). Clamped at batch start to exceed
    /// the per-attempt timeout, so a live attempt can never be swept.
    pub lease: Duration,
    pub sweep_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            retry: RetryPolicy::default(),
            lease: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(8),
        }
    }
}

/// Settled results of a whole batch, partitioned for the finalizer.
#[derive(Debug, Clone)]
pub struct BatchResults<R> {
    pub successful: Vec<(u64, R)>,
    pub failed: Vec<(u64, String)>,
}

impl<R> BatchResults<R> {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The exactly-once downstream step, run by the lock winner.
pub type Finalizer<R> = Box<dyn FnOnce(BatchResults<R>) -> BoxFuture + Send>;

/// Coordinates a worker pool against one batch at a time.
pub struct JobOrchestrator<R> {
    store: Arc<dyn BatchStore<R>>,
    config: OrchestratorConfig,
}

impl<R: Clone + Send + Sync + 'static> JobOrchestrator<R> {
    pub fn new(store: Arc<dyn BatchStore<R>>, config: OrchestratorConfig) -> Self {
        Self { store, config }
    }

    /// Run `items` to completion and finalize exactly once.
    ///
    /// Returns once every job has settled and the finalizer has run. An
    /// empty batch finalizes immediately with empty results.
    pub async fn run_batch<T, H, Fut>(
        &self,
        key: BatchKey,
        items: Vec<T>,
        handler: H,
        finalizer: Finalizer<R>,
    ) -> QueueResult<()>
    where
        T: Clone + Send + Sync + 'static,
        H: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, JobError>> + Send + 'static,
    {
        let total = items.len() as u64;
        if total == 0 {
            finalizer(BatchResults {
                successful: vec![],
                failed: vec![],
            })
            .await;
            return Ok(());
        }

        self.store.create_batch(&key, total)?;

        // A lease shorter than one attempt would let the stall sweep
        // redeliver a job whose worker is still working on it.
        let lease = self
            .config
            .lease
            .max(self.config.retry.job_timeout + self.config.sweep_interval);
        let queue = Arc::new(JobQueue::new(lease));
        queue.push_all(items);

        let handler = Arc::new(handler);
        let finalizer = Arc::new(Mutex::new(Some(finalizer)));
        let (done_tx, done_rx) = watch::channel(false);

        // Stall sweep: requeues jobs whose worker died mid-flight.
        let sweeper = {
            let queue = queue.clone();
            let mut done = done_rx.clone();
            let interval = self.config.sweep_interval;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = done.changed() => break,
                        _ = tokio::time::sleep(interval) => {
                            queue.sweep_stalled();
                        }
                    }
                }
            })
        };

        let workers: Vec<_> = (0..self.config.concurrency)
            .map(|_| {
                tokio::spawn(worker_loop(
                    key.clone(),
                    total,
                    queue.clone(),
                    self.store.clone(),
                    handler.clone(),
                    finalizer.clone(),
                    self.config.retry.clone(),
                    done_tx.clone(),
                    done_rx.clone(),
                ))
            })
            .collect();

        for worker in workers {
            let _ = worker.await;
        }
        sweeper.abort();

        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop<T, R, H, Fut>(
    key: BatchKey,
    total: u64,
    queue: Arc<JobQueue<T>>,
    store: Arc<dyn BatchStore<R>>,
    handler: Arc<H>,
    finalizer: Arc<Mutex<Option<Finalizer<R>>>>,
    retry: RetryPolicy,
    done_tx: watch::Sender<bool>,
    mut done_rx: watch::Receiver<bool>,
) where
    T: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    H: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, JobError>> + Send + 'static,
{
    loop {
        if *done_rx.borrow() {
            break;
        }

        let Some(job) = queue.pop() else {
            if *done_rx.borrow() {
                break;
            }
            // Park until woken by an enqueue, a requeue, or shutdown;
            // the timer catches delayed jobs coming due.
            tokio::select! {
                _ = queue.work_available() => {}
                _ = done_rx.changed() => {}
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
            continue;
        };

        let attempt_result =
            tokio::time::timeout(retry.job_timeout, handler(job.payload.clone())).await;

        let outcome = match attempt_result {
            Ok(Ok(result)) => Some(JobOutcome::Succeeded(result)),
            Ok(Err(JobError::Permanent(reason))) => Some(JobOutcome::Failed { reason }),
            Ok(Err(JobError::Transient(reason))) => {
                maybe_retry(&queue, job.clone(), &retry, reason)
            }
            Err(_) => maybe_retry(&queue, job.clone(), &retry, "attempt timed out".to_string()),
        };

        let Some(outcome) = outcome else {
            continue; // redelivered via the delayed set
        };

        queue.ack(job.id);

        let receipt = match store.record_outcome(&key, job.id, outcome) {
            Ok(receipt) => receipt,
            Err(e) => {
                // Settling the same job twice or overflowing the batch is
                // a concurrency-control defect; surface it loudly.
                error!(batch = %key, job_id = job.id, error = %e, "failed to record job outcome");
                continue;
            }
        };

        info!(
            batch = %key,
            job_id = job.id,
            progress = receipt.progress,
            total,
            "job settled"
        );

        if receipt.finalize_won {
            run_finalizer(&key, &store, &finalizer, &done_tx).await;
        }
    }
}

/// Decide between redelivery and a permanent failure record.
fn maybe_retry<T: Clone, R>(
    queue: &JobQueue<T>,
    job: Job<T>,
    retry: &RetryPolicy,
    reason: String,
) -> Option<JobOutcome<R>> {
    let budget_left =
        job.attempt < retry.max_retries && job.enqueued_at.elapsed() < retry.total_timeout;

    if budget_left {
        let delay = retry.backoff_base * 2u32.saturating_pow(job.attempt);
        warn!(
            job_id = job.id,
            attempt = job.attempt,
            delay_ms = delay.as_millis() as u64,
            %reason,
            "job attempt failed, retrying"
        );
        queue.requeue_after(job, delay);
        None
    } else {
        Some(JobOutcome::Failed {
            reason: format!("{reason} (retry budget exhausted)"),
        })
    }
}

async fn run_finalizer<R: Clone>(
    key: &BatchKey,
    store: &Arc<dyn BatchStore<R>>,
    finalizer: &Arc<Mutex<Option<Finalizer<R>>>>,
    done_tx: &watch::Sender<bool>,
) {
    let taken = finalizer
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();

    let Some(finalize) = taken else {
        // The store granted the lock twice — must never happen.
        error!(batch = %key, error = %QueueError::FinalizeRace(key.storage_key()), "refusing second finalization");
        return;
    };

    let results = match store.load_results(key) {
        Ok(results) => results,
        Err(e) => {
            error!(batch = %key, error = %e, "failed to load batch results for finalization");
            let _ = done_tx.send(true);
            return;
        }
    };

    let mut partitioned = BatchResults {
        successful: vec![],
        failed: vec![],
    };
    for (job_id, outcome) in results {
        match outcome {
            JobOutcome::Succeeded(result) => partitioned.successful.push((job_id, result)),
            JobOutcome::Failed { reason } => partitioned.failed.push((job_id, reason)),
        }
    }

    info!(
        batch = %key,
        successful = partitioned.successful.len(),
        failed = partitioned.failed.len(),
        "finalizing batch"
    );

    finalize(partitioned).await;
    let _ = done_tx.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::InMemoryBatchStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn orchestrator<R: Clone + Send + Sync + 'static>(
        concurrency: usize,
        retry: RetryPolicy,
    ) -> JobOrchestrator<R> {
        let store: Arc<dyn BatchStore<R>> = Arc::new(InMemoryBatchStore::<R>::default());
        JobOrchestrator::new(
            store,
            OrchestratorConfig {
                concurrency,
                retry,
                lease: Duration::from_secs(60),
                sweep_interval: Duration::from_millis(20),
            },
        )
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(1),
            job_timeout: Duration::from_secs(5),
            total_timeout: Duration::from_secs(30),
        }
    }

    fn key() -> BatchKey {
        BatchKey::new("eco", 1, "test")
    }

    fn capture_finalizer<R: Send + 'static>(
    ) -> (Finalizer<R>, tokio::sync::oneshot::Receiver<BatchResults<R>>) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let finalizer: Finalizer<R> = Box::new(move |results| {
            Box::pin(async move {
                let _ = tx.send(results);
            })
        });
        (finalizer, rx)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn all_jobs_succeed_and_finalize_once() {
        let orch = orchestrator::<u64>(4, fast_retry(3));
        let (finalizer, captured) = capture_finalizer();

        orch.run_batch(
            key(),
            (0..25u64).collect(),
            |n| async move { Ok(n * 2) },
            finalizer,
        )
        .await
        .unwrap();

        let results = captured.await.unwrap();
        assert_eq!(results.successful.len(), 25);
        assert!(results.all_succeeded());
        // Results line up with their job ids.
        for (job_id, value) in &results.successful {
            assert_eq!(*value, job_id * 2);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_failures_are_retried_to_success() {
        let attempts: Arc<Mutex<HashMap<u64, u32>>> = Arc::new(Mutex::new(HashMap::new()));
        let orch = orchestrator::<u64>(4, fast_retry(3));
        let (finalizer, captured) = capture_finalizer();

        let seen = attempts.clone();
        orch.run_batch(
            key(),
            (0..10u64).collect(),
            move |n| {
                let seen = seen.clone();
                async move {
                    let attempt = {
                        let mut map = seen.lock().unwrap();
                        let entry = map.entry(n).or_insert(0);
                        *entry += 1;
                        *entry
                    };
                    if attempt == 1 {
                        Err(JobError::Transient("flaky".into()))
                    } else {
                        Ok(n)
                    }
                }
            },
            finalizer,
        )
        .await
        .unwrap();

        let results = captured.await.unwrap();
        assert!(results.all_succeeded());
        assert_eq!(results.successful.len(), 10);
        assert!(attempts.lock().unwrap().values().all(|&a| a == 2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn permanent_failures_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let orch = orchestrator::<u64>(2, fast_retry(5));
        let (finalizer, captured) = capture_finalizer();

        let counter = calls.clone();
        orch.run_batch(
            key(),
            vec![0u64, 1],
            move |n| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(JobError::Permanent("project not found".into()))
                    } else {
                        Ok(n)
                    }
                }
            },
            finalizer,
        )
        .await
        .unwrap();

        let results = captured.await.unwrap();
        assert_eq!(results.successful.len(), 1);
        assert_eq!(results.failed.len(), 1);
        assert_eq!(results.failed[0].1, "project not found");
        // One call per job: the permanent failure was never redelivered.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_budget_exhaustion_becomes_permanent_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let orch = orchestrator::<u64>(2, fast_retry(2));
        let (finalizer, captured) = capture_finalizer();

        let counter = calls.clone();
        orch.run_batch(
            key(),
            vec![0u64],
            move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<u64, _>(JobError::Transient("still down".into()))
                }
            },
            finalizer,
        )
        .await
        .unwrap();

        let results = captured.await.unwrap();
        assert_eq!(results.failed.len(), 1);
        assert!(results.failed[0].1.contains("retry budget exhausted"));
        // Initial attempt + max_retries redeliveries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_batch_finalizes_immediately() {
        let orch = orchestrator::<u64>(2, fast_retry(1));
        let (finalizer, captured) = capture_finalizer();

        orch.run_batch(key(), vec![], |n: u64| async move { Ok(n) }, finalizer)
            .await
            .unwrap();

        let results = captured.await.unwrap();
        assert!(results.successful.is_empty());
        assert!(results.failed.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_handler_is_not_redelivered_by_the_stall_sweep() {
        let calls = Arc::new(AtomicU32::new(0));
        let store: Arc<dyn BatchStore<u64>> = Arc::new(InMemoryBatchStore::<u64>::default());
        let orch = JobOrchestrator::new(
            store,
            OrchestratorConfig {
                concurrency: 2,
                retry: fast_retry(3),
                // Misconfigured lease far below the attempt duration; the
                // clamp must keep the sweep off a live attempt.
                lease: Duration::from_millis(10),
                sweep_interval: Duration::from_millis(5),
            },
        );
        let (finalizer, captured) = capture_finalizer();

        let counter = calls.clone();
        orch.run_batch(
            key(),
            vec![7u64],
            move |n| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(n)
                }
            },
            finalizer,
        )
        .await
        .unwrap();

        let results = captured.await.unwrap();
        assert!(results.all_succeeded());
        // The attempt outlived the configured lease but was never swept
        // and re-run.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn finalize_runs_exactly_once_with_many_racing_workers() {
        use rand::Rng;

        let finalize_count = Arc::new(AtomicU32::new(0));
        let orch = orchestrator::<u64>(16, fast_retry(0));

        let counter = finalize_count.clone();
        let finalizer: Finalizer<u64> = Box::new(move |_| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });

        orch.run_batch(
            key(),
            (0..100u64).collect(),
            |n| async move {
                // Random jitter shuffles settlement order across workers.
                let jitter = rand::thread_rng().gen_range(0..5);
                tokio::time::sleep(Duration::from_millis(jitter)).await;
                Ok(n)
            },
            finalizer,
        )
        .await
        .unwrap();

        assert_eq!(finalize_count.load(Ordering::SeqCst), 1);
    }
}
