//! Batch completion tracking with an atomic record-outcome step.
//!
//! The store keeps, per batch: a results map keyed by job id, a success
//! counter, a failure counter, and a short-lived completion lock. The
//! reference deployment runs the increment + compare + lock sequence as a
//! single server-side script; here the same guarantee comes from doing
//! the whole sequence inside one critical section of the store mutex.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QueueError, QueueResult};

/// Lock expiry — a safety net against a crashed finalizer, not a
/// long-held resource lock.
pub const DEFAULT_LOCK_EXPIRY: Duration = Duration::from_secs(60);

/// Identifies one batch: `{ecosystem}:{chain}:{job_type}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub ecosystem: String,
    pub chain_id: u64,
    pub job_type: &'static str,
}

impl BatchKey {
    pub fn new(ecosystem: impl Into<String>, chain_id: u64, job_type: &'static str) -> Self {
        Self {
            ecosystem: ecosystem.into(),
            chain_id,
            job_type,
        }
    }

    /// Storage key prefix shared by the batch's results, counters, and lock.
    pub fn storage_key(&self) -> String {
        format!("{}:{}:{}", self.ecosystem, self.chain_id, self.job_type)
    }
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Terminal outcome of one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobOutcome<R> {
    Succeeded(R),
    Failed { reason: String },
}

impl<R> JobOutcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// What one `record_outcome` call observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordReceipt {
    /// True for exactly one call per batch: the caller now owns
    /// finalization.
    pub finalize_won: bool,
    /// Settled jobs so far (success + failure), including this one.
    pub progress: u64,
    /// Total jobs in the batch.
    pub total: u64,
}

/// Shared completion-tracking store.
///
/// `record_outcome` is the only operation concurrent workers invoke; its
/// whole effect must be atomic with respect to other `record_outcome`
/// calls on the same batch.
pub trait BatchStore<R>: Send + Sync {
    /// Register a batch of `total` jobs. Idempotent per key.
    fn create_batch(&self, key: &BatchKey, total: u64) -> QueueResult<()>;

    /// Atomically: store the result, bump one counter, read both
    /// counters, and — only if all jobs are settled — attempt the
    /// completion lock. Returns whether this call won the lock.
    fn record_outcome(
        &self,
        key: &BatchKey,
        job_id: u64,
        outcome: JobOutcome<R>,
    ) -> QueueResult<RecordReceipt>;

    /// Load all settled results of a batch.
    fn load_results(&self, key: &BatchKey) -> QueueResult<Vec<(u64, JobOutcome<R>)>>;

    /// Drop the batch's results, counters, and lock.
    fn delete_batch(&self, key: &BatchKey) -> QueueResult<()>;
}

struct BatchEntry<R> {
    total: u64,
    success: u64,
    failure: u64,
    results: HashMap<u64, JobOutcome<R>>,
    lock_taken_at: Option<Instant>,
}

/// In-process `BatchStore` backed by a mutex-guarded map.
pub struct InMemoryBatchStore<R> {
    batches: Mutex<HashMap<String, BatchEntry<R>>>,
    lock_expiry: Duration,
}

impl<R> Default for InMemoryBatchStore<R> {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_EXPIRY)
    }
}

impl<R> InMemoryBatchStore<R> {
    pub fn new(lock_expiry: Duration) -> Self {
        Self {
            batches: Mutex::new(HashMap::new()),
            lock_expiry,
        }
    }
}

impl<R: Clone + Send + Sync> BatchStore<R> for InMemoryBatchStore<R> {
    fn create_batch(&self, key: &BatchKey, total: u64) -> QueueResult<()> {
        let mut batches = self.batches.lock().unwrap_or_else(|e| e.into_inner());
        batches
            .entry(key.storage_key())
            .or_insert_with(|| BatchEntry {
                total,
                success: 0,
                failure: 0,
                results: HashMap::new(),
                lock_taken_at: None,
            });
        debug!(batch = %key, total, "batch created");
        Ok(())
    }

    fn record_outcome(
        &self,
        key: &BatchKey,
        job_id: u64,
        outcome: JobOutcome<R>,
    ) -> QueueResult<RecordReceipt> {
        // One critical section covers write + increment + compare + lock.
        let mut batches = self.batches.lock().unwrap_or_else(|e| e.into_inner());
        let entry = batches
            .get_mut(&key.storage_key())
            .ok_or_else(|| QueueError::UnknownBatch(key.storage_key()))?;

        if entry.results.contains_key(&job_id) {
            return Err(QueueError::DuplicateOutcome {
                batch: key.storage_key(),
                job_id,
            });
        }
        if entry.success + entry.failure >= entry.total {
            return Err(QueueError::OutcomeOverflow {
                batch: key.storage_key(),
                total: entry.total,
            });
        }

        if outcome.is_success() {
            entry.success += 1;
        } else {
            entry.failure += 1;
        }
        entry.results.insert(job_id, outcome);

        let progress = entry.success + entry.failure;
        let mut finalize_won = false;

        if progress == entry.total {
            let expired = entry
                .lock_taken_at
                .is_some_and(|taken| taken.elapsed() >= self.lock_expiry);
            if entry.lock_taken_at.is_none() || expired {
                entry.lock_taken_at = Some(Instant::now());
                finalize_won = true;
            }
        }

        Ok(RecordReceipt {
            finalize_won,
            progress,
            total: entry.total,
        })
    }

    fn load_results(&self, key: &BatchKey) -> QueueResult<Vec<(u64, JobOutcome<R>)>> {
        let batches = self.batches.lock().unwrap_or_else(|e| e.into_inner());
        let entry = batches
            .get(&key.storage_key())
            .ok_or_else(|| QueueError::UnknownBatch(key.storage_key()))?;

        let mut results: Vec<(u64, JobOutcome<R>)> = entry
            .results
            .iter()
            .map(|(id, outcome)| (*id, outcome.clone()))
            .collect();
        results.sort_by_key(|(id, _)| *id);
        Ok(results)
    }

    fn delete_batch(&self, key: &BatchKey) -> QueueResult<()> {
        let mut batches = self.batches.lock().unwrap_or_else(|e| e.into_inner());
        batches.remove(&key.storage_key());
        debug!(batch = %key, "batch deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn key() -> BatchKey {
        BatchKey::new("eco-1", 1, "verify")
    }

    #[test]
    fn storage_key_separates_ecosystems_and_chains() {
        let a = BatchKey::new("eco-1", 1, "verify");
        let b = BatchKey::new("eco-1", 2, "verify");
        let c = BatchKey::new("eco-2", 1, "verify");
        let d = BatchKey::new("eco-1", 1, "sub-lists");

        let keys = [a.storage_key(), b.storage_key(), c.storage_key(), d.storage_key()];
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn last_settlement_wins_the_lock() {
        let store = InMemoryBatchStore::<u32>::default();
        store.create_batch(&key(), 3).unwrap();

        let first = store
            .record_outcome(&key(), 0, JobOutcome::Succeeded(1))
            .unwrap();
        assert!(!first.finalize_won);
        assert_eq!(first.progress, 1);

        let second = store
            .record_outcome(&key(), 1, JobOutcome::Failed { reason: "x".into() })
            .unwrap();
        assert!(!second.finalize_won);

        let third = store
            .record_outcome(&key(), 2, JobOutcome::Succeeded(3))
            .unwrap();
        assert!(third.finalize_won);
        assert_eq!(third.progress, 3);
        assert_eq!(third.total, 3);
    }

    #[test]
    fn lock_is_won_exactly_once_under_concurrency() {
        // 100 jobs settling from 8 threads in arbitrary order: the lock
        // must be granted exactly once.
        const N: u64 = 100;
        let store = Arc::new(InMemoryBatchStore::<u64>::default());
        store.create_batch(&key(), N).unwrap();

        let wins = Arc::new(AtomicU64::new(0));
        let next_job = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let wins = wins.clone();
                let next_job = next_job.clone();
                std::thread::spawn(move || loop {
                    let job_id = next_job.fetch_add(1, Ordering::SeqCst);
                    if job_id >= N {
                        break;
                    }
                    let receipt = store
                        .record_outcome(&key(), job_id, JobOutcome::Succeeded(job_id))
                        .unwrap();
                    if receipt.finalize_won {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_settlement_is_rejected() {
        let store = InMemoryBatchStore::<u32>::default();
        store.create_batch(&key(), 2).unwrap();
        store
            .record_outcome(&key(), 0, JobOutcome::Succeeded(1))
            .unwrap();

        let result = store.record_outcome(&key(), 0, JobOutcome::Succeeded(1));
        assert!(matches!(
            result,
            Err(QueueError::DuplicateOutcome { job_id: 0, .. })
        ));
    }

    #[test]
    fn overflow_is_rejected() {
        let store = InMemoryBatchStore::<u32>::default();
        store.create_batch(&key(), 1).unwrap();
        store
            .record_outcome(&key(), 0, JobOutcome::Succeeded(1))
            .unwrap();

        let result = store.record_outcome(&key(), 1, JobOutcome::Succeeded(2));
        assert!(matches!(result, Err(QueueError::OutcomeOverflow { .. })));
    }

    #[test]
    fn unknown_batch_is_rejected() {
        let store = InMemoryBatchStore::<u32>::default();
        let result = store.record_outcome(&key(), 0, JobOutcome::Succeeded(1));
        assert_eq!(result, Err(QueueError::UnknownBatch(key().storage_key())));
    }

    #[test]
    fn expired_lock_can_be_retaken() {
        // Zero expiry: a crashed finalizer's lock is immediately stale.
        let store = InMemoryBatchStore::<u32>::new(Duration::ZERO);
        store.create_batch(&key(), 1).unwrap();

        let receipt = store
            .record_outcome(&key(), 0, JobOutcome::Succeeded(1))
            .unwrap();
        assert!(receipt.finalize_won);

        // The batch is complete and the lock expired; a re-delivered
        // settlement of a *new* batch generation would take it again.
        // Here we just verify the expiry check via a fresh outcome on a
        // recreated batch.
        store.delete_batch(&key()).unwrap();
        store.create_batch(&key(), 1).unwrap();
        let receipt = store
            .record_outcome(&key(), 0, JobOutcome::Succeeded(1))
            .unwrap();
        assert!(receipt.finalize_won);
    }

    #[test]
    fn load_results_partitions_cleanly() {
        let store = InMemoryBatchStore::<&'static str>::default();
        store.create_batch(&key(), 3).unwrap();
        store
            .record_outcome(&key(), 0, JobOutcome::Succeeded("a"))
            .unwrap();
        store
            .record_outcome(
                &key(),
                1,
                JobOutcome::Failed {
                    reason: "not found".into(),
                },
            )
            .unwrap();
        store
            .record_outcome(&key(), 2, JobOutcome::Succeeded("c"))
            .unwrap();

        let results = store.load_results(&key()).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|(_, o)| o.is_success()).count(), 2);
    }

    #[test]
    fn delete_batch_forgets_everything() {
        let store = InMemoryBatchStore::<u32>::default();
        store.create_batch(&key(), 1).unwrap();
        store
            .record_outcome(&key(), 0, JobOutcome::Succeeded(1))
            .unwrap();

        store.delete_batch(&key()).unwrap();
        assert!(matches!(
            store.load_results(&key()),
            Err(QueueError::UnknownBatch(_))
        ));
    }
}
