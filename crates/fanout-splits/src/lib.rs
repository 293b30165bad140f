//! fanout-splits — bounded hierarchical splits construction.
//!
//! The on-chain splits primitive caps each receiver list at
//! [`MAX_RECEIVERS`] slots and requires the integer weights of a list to
//! sum to exactly [`TOTAL_WEIGHT`]. This crate converts a flat list of
//! weighted accounts into a two-level structure that respects both
//! constraints:
//!
//! - Level 1 holds direct receivers plus references to sub-lists.
//! - Level 2 sub-lists hold only direct receivers.
//! - 200 sub-lists × 200 receivers gives the 40,000-account ceiling.
//!
//! Weights are normalized per level with a largest-remainder pass that
//! reserves a minimum of 1 for every positive-weight entry, because the
//! primitive rejects zero-weight receivers.

pub mod builder;
pub mod normalize;

mod error;

pub use builder::{batch_sub_lists, build, Receiver, SplitsPlan, SubList, WeightedAccount};
pub use error::{SplitsError, SplitsResult};
pub use normalize::largest_remainder;

/// Maximum slots per receiver list, enforced by the on-chain primitive.
pub const MAX_RECEIVERS: usize = 200;

/// Exact integer weight sum required per receiver list.
pub const TOTAL_WEIGHT: u32 = 1_000_000;

/// Maximum accounts a two-level structure can address.
pub const MAX_NODES: usize = 40_000;

/// Number of sub-lists created per on-chain transaction job.
pub const SUB_LISTS_PER_BATCH: usize = 20;
