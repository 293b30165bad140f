//! Error types for the pipelines.

use thiserror::Error;
use uuid::Uuid;

use fanout_state::EcosystemState;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Graph validation failures; one message per violation.
    #[error("graph validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("ecosystem {0} not found")]
    NotFound(Uuid),

    #[error("ecosystem is {actual:?}, expected {expected:?}")]
    WrongState {
        expected: EcosystemState,
        actual: EcosystemState,
    },

    /// A guarantee an earlier stage was supposed to establish did not
    /// hold. Never a user error.
    #[error("internal consistency violation: {0}")]
    Internal(String),

    #[error(transparent)]
    State(#[from] fanout_state::StateError),

    #[error(transparent)]
    Graph(#[from] fanout_graph::GraphError),

    #[error(transparent)]
    Splits(#[from] fanout_splits::SplitsError),

    #[error(transparent)]
    Queue(#[from] fanout_queue::QueueError),

    #[error(transparent)]
    Chain(#[from] fanout_chain::ChainError),
}
