//! Error types for the job orchestrator.

use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur during batch tracking.
///
/// All of these indicate an internal-consistency defect (a batch that was
/// never created, a job settled twice, more settlements than jobs) rather
/// than a user or job failure — job failures are data, carried in
/// [`crate::JobOutcome`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("unknown batch '{0}'")]
    UnknownBatch(String),

    #[error("job {job_id} in batch '{batch}' settled twice")]
    DuplicateOutcome { batch: String, job_id: u64 },

    #[error("batch '{batch}' recorded more outcomes than its {total} jobs")]
    OutcomeOverflow { batch: String, total: u64 },

    #[error("finalization for batch '{0}' ran more than once")]
    FinalizeRace(String),
}
