//! Error types for splits construction.

use thiserror::Error;

/// Result type alias for splits operations.
pub type SplitsResult<T> = Result<T, SplitsError>;

/// Errors that can occur while building or normalizing a splits plan.
#[derive(Debug, Error, PartialEq)]
pub enum SplitsError {
    #[error("too many accounts: {0} exceeds the {max} addressable by a two-level structure", max = crate::MAX_NODES)]
    TooManyAccounts(usize),

    #[error("need {0} sub-lists, but a receiver list can only reference {max}", max = crate::MAX_RECEIVERS)]
    TooManySubLists(usize),

    #[error("no accounts with positive weight")]
    NoPositiveWeights,

    #[error("cannot normalize an empty receiver list")]
    EmptyLevel,

    #[error("cannot give {entries} receivers a minimum of 1 unit each out of {total}")]
    TooManyEntries { entries: usize, total: u32 },

    #[error("total weight of a receiver list must not be zero")]
    ZeroTotalWeight,
}
