//! fanout-state — ecosystem aggregates and persistence.
//!
//! An `Ecosystem` is one submitted graph and its lifecycle record. This
//! crate holds the aggregate types, the pure lifecycle state machine, and
//! a redb-backed store. Nodes, edges, and propagated weights are written
//! in a single transaction per finalize call, so an ecosystem is never
//! observable in a half-saved state.

pub mod machine;
pub mod store;
pub mod tables;
pub mod types;

mod error;

pub use error::{StateError, StateResult};
pub use machine::transition;
pub use store::EcosystemStore;
pub use types::*;
