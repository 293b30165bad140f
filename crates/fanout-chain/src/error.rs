//! Error types for chain access.

use thiserror::Error;

/// Result type alias for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("no chain client registered for chain {0}")]
    UnsupportedChain(u64),

    #[error("transaction submission failed: {0}")]
    SubmitFailed(String),

    #[error("transaction {tx_hash} not confirmed after {waited_secs}s")]
    ConfirmationTimeout { tx_hash: String, waited_secs: u64 },

    #[error("confirmation poll failed for {tx_hash}: {reason}")]
    PollFailed { tx_hash: String, reason: String },

    #[error("metadata pinning failed: {0}")]
    PinFailed(String),
}
