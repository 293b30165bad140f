//! fanout-queue — the distributed-completion job orchestrator.
//!
//! Runs N independent, idempotent units of work on a worker pool, retries
//! transient failures with exponential backoff, and triggers exactly one
//! finalization step after the last job settles — no matter which worker
//! settles it or how many settle concurrently.
//!
//! The crux is [`batch::BatchStore::record_outcome`]: writing a job's
//! result, bumping the success or failure counter, comparing the combined
//! count against N, and attempting the completion lock all happen as one
//! atomic step against the shared store. Two workers finishing at the same
//! instant can therefore never both win finalization, and the true last
//! settlement can never fail to trigger it.
//!
//! Batch tracking keys follow `{ecosystem}:{chain}:{job_type}`, so two
//! chains or two ecosystems never collide.

pub mod batch;
pub mod queue;
pub mod worker;

mod error;

pub use batch::{BatchKey, BatchStore, InMemoryBatchStore, JobOutcome, RecordReceipt};
pub use error::{QueueError, QueueResult};
pub use queue::{Job, JobQueue};
pub use worker::{
    BatchResults, Finalizer, JobError, JobOrchestrator, OrchestratorConfig, RetryPolicy,
};
