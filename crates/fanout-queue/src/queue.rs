//! In-process job queue with delayed redelivery and stall detection.
//!
//! Jobs move ready → in-flight on pop, with a lease deadline. A worker
//! that settles its job acks it; a worker that dies mid-job simply never
//! acks, and the periodic stall sweep moves the expired lease back to the
//! ready queue (the crash-equals-timeout model). Retries re-enter through
//! the delayed set so backoff never blocks a worker. Idle consumers park
//! on the queue's wake signal rather than polling.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, warn};

/// One schedulable unit of work.
#[derive(Debug, Clone)]
pub struct Job<T> {
    pub id: u64,
    pub payload: T,
    /// Zero-based attempt counter; bumped on each redelivery.
    pub attempt: u32,
    /// When the job first entered the queue (total-timeout anchor).
    pub enqueued_at: Instant,
}

struct QueueInner<T> {
    ready: VecDeque<Job<T>>,
    delayed: Vec<(Instant, Job<T>)>,
    in_flight: HashMap<u64, (Instant, Job<T>)>,
}

/// A shared multi-consumer job queue.
pub struct JobQueue<T> {
    inner: Mutex<QueueInner<T>>,
    lease: Duration,
    wake: Notify,
}

impl<T: Clone> JobQueue<T> {
    pub fn new(lease: Duration) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                ready: VecDeque::new(),
                delayed: Vec::new(),
                in_flight: HashMap::new(),
            }),
            lease,
            wake: Notify::new(),
        }
    }

    /// Enqueue a fresh batch of payloads; ids are their batch positions.
    pub fn push_all(&self, payloads: Vec<T>) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for (id, payload) in payloads.into_iter().enumerate() {
            inner.ready.push_back(Job {
                id: id as u64,
                payload,
                attempt: 0,
                enqueued_at: now,
            });
        }
        drop(inner);
        self.wake.notify_waiters();
    }

    /// Resolves when work may have become ready. Only tasks already
    /// waiting are woken, so callers pair this with a timer fallback.
    pub async fn work_available(&self) {
        self.wake.notified().await;
    }

    /// Pop the next due job, marking it in-flight under a lease.
    /// Promotes due delayed jobs first.
    pub fn pop(&self) -> Option<Job<T>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *inner;

        let mut still_delayed = Vec::new();
        for (due, job) in inner.delayed.drain(..) {
            if due <= now {
                inner.ready.push_back(job);
            } else {
                still_delayed.push((due, job));
            }
        }
        inner.delayed = still_delayed;

        let job = inner.ready.pop_front()?;
        inner
            .in_flight
            .insert(job.id, (now + self.lease, job.clone()));
        Some(job)
    }

    /// Acknowledge a settled job, releasing its lease.
    pub fn ack(&self, job_id: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.in_flight.remove(&job_id);
    }

    /// Re-deliver a job after `delay`, with its attempt counter bumped.
    pub fn requeue_after(&self, mut job: Job<T>, delay: Duration) {
        job.attempt += 1;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.in_flight.remove(&job.id);
        inner.delayed.push((Instant::now() + delay, job));
        drop(inner);
        self.wake.notify_waiters();
    }

    /// Move jobs whose lease expired back to the ready queue.
    /// Returns how many were requeued.
    pub fn sweep_stalled(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let stalled: Vec<u64> = inner
            .in_flight
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &stalled {
            if let Some((_, mut job)) = inner.in_flight.remove(id) {
                warn!(job_id = job.id, attempt = job.attempt, "stalled job requeued");
                job.attempt += 1;
                inner.ready.push_back(job);
            }
        }

        if !stalled.is_empty() {
            debug!(count = stalled.len(), "stall sweep requeued jobs");
            drop(inner);
            self.wake.notify_waiters();
        }
        stalled.len()
    }

    /// True when nothing is ready, delayed, or in flight.
    pub fn is_drained(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.ready.is_empty() && inner.delayed.is_empty() && inner.in_flight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_delivers_in_order_and_tracks_leases() {
        let queue = JobQueue::new(Duration::from_secs(60));
        queue.push_all(vec!["a", "b"]);

        let first = queue.pop().unwrap();
        assert_eq!((first.id, first.payload), (0, "a"));
        assert!(!queue.is_drained());

        let second = queue.pop().unwrap();
        assert_eq!(second.id, 1);
        assert!(queue.pop().is_none());

        queue.ack(0);
        queue.ack(1);
        assert!(queue.is_drained());
    }

    #[test]
    fn requeue_after_zero_delay_is_immediately_due() {
        let queue = JobQueue::new(Duration::from_secs(60));
        queue.push_all(vec!["a"]);

        let job = queue.pop().unwrap();
        queue.requeue_after(job, Duration::ZERO);

        let retried = queue.pop().unwrap();
        assert_eq!(retried.attempt, 1);
    }

    #[test]
    fn delayed_job_is_not_due_early() {
        let queue = JobQueue::new(Duration::from_secs(60));
        queue.push_all(vec!["a"]);

        let job = queue.pop().unwrap();
        queue.requeue_after(job, Duration::from_secs(3600));

        assert!(queue.pop().is_none());
        assert!(!queue.is_drained());
    }

    #[test]
    fn sweep_requeues_expired_leases() {
        // Zero lease: an un-acked pop is immediately stalled.
        let queue = JobQueue::new(Duration::ZERO);
        queue.push_all(vec!["a"]);

        let job = queue.pop().unwrap();
        assert_eq!(job.attempt, 0);

        assert_eq!(queue.sweep_stalled(), 1);
        let redelivered = queue.pop().unwrap();
        assert_eq!(redelivered.attempt, 1);
    }

    #[test]
    fn sweep_leaves_live_leases_alone() {
        let queue = JobQueue::new(Duration::from_secs(60));
        queue.push_all(vec!["a"]);
        let _job = queue.pop().unwrap();

        assert_eq!(queue.sweep_stalled(), 0);
        assert!(queue.pop().is_none());
    }

    #[tokio::test]
    async fn push_wakes_a_parked_consumer() {
        use std::sync::Arc;

        let queue = Arc::new(JobQueue::new(Duration::from_secs(60)));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue.work_available().await;
            })
        };
        // Let the waiter register before the push.
        tokio::task::yield_now().await;

        queue.push_all(vec!["a"]);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("consumer was never woken")
            .unwrap();
    }
}
