//! fanout-pipeline — the two ecosystem pipelines.
//!
//! Creation: validate → persist → per-node verification fan-out →
//! exactly-once finalize (propagate weights, save graph, advance state).
//! Deployment: splits plan → sub-list transaction fan-out → exactly-once
//! finalize (pin metadata, assemble main account, record its id).
//!
//! External collaborators (project registry, chain, pinning) enter
//! through traits so the pipelines stay testable without a network.

pub mod create;
pub mod deploy;
pub mod verify;

mod error;

pub use create::{CreationPipeline, SubmitRequest, VerifiedNode};
pub use deploy::DeploymentPipeline;
pub use error::{PipelineError, PipelineResult};
pub use verify::{
    verify_node, ProjectVerifier, RegistryVerifier, StaticVerifier, VerifiedProject, VerifyError,
};
