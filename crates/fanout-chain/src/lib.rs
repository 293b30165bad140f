//! fanout-chain — chain access for the deployment pipeline.
//!
//! Defines the [`ChainClient`] contract (batched submission, confirmation
//! polling, deterministic account-id derivation), a per-chain memoizing
//! [`ChainRegistry`], bounded confirmation waiting, and the
//! [`MetadataPinner`] contract used during main-account assembly. The
//! [`dev::DevChainClient`] simulator backs local runs and tests.

pub mod client;
pub mod confirm;
pub mod dev;
pub mod metadata;
pub mod registry;

mod error;

pub use client::{random_salt, ChainClient, ContractCall, TxHandle};
pub use confirm::{wait_until_confirmed, ConfirmPolicy};
pub use dev::DevChainClient;
pub use error::{ChainError, ChainResult};
pub use metadata::{InMemoryPinner, MetadataPinner};
pub use registry::ChainRegistry;
