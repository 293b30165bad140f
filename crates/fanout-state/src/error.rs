//! Error types for the ecosystem store and state machine.

use thiserror::Error;

use crate::types::{EcosystemEvent, EcosystemState};

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur in the store or during a lifecycle transition.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("ecosystem not found: {0}")]
    NotFound(String),

    #[error("event {event:?} is not valid in state {state:?}")]
    InvalidTransition {
        state: EcosystemState,
        event: EcosystemEvent,
    },
}
