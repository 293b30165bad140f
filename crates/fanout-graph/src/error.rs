//! Error types for graph computation.

use thiserror::Error;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Internal-consistency failures during weight propagation.
///
/// These indicate a defect upstream (validation should make them
/// unreachable), so they are distinct from user-facing validation
/// violations, which are plain strings collected by the validator.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("root node missing from adjacency structure")]
    MissingRoot,

    #[error("edge endpoint '{0}' missing from adjacency structure")]
    MissingEndpoint(String),
}
