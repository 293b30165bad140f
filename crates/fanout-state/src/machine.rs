//! The ecosystem lifecycle state machine.
//!
//! ```text
//! processing_graph ──PROCESSING_COMPLETED──▶ pending_deployment
//!        │                                          │
//!        │                               DEPLOYMENT_STARTED
//!        │                                          ▼
//!        │                                      deploying ──DEPLOYMENT_COMPLETED──▶ deployed
//!        │                                          │
//!        └──PROCESSING_FAILED──▶ error ◀──DEPLOYMENT_FAILED──┘
//! ```
//!
//! `deployed` and `error` are terminal. The machine is a pure function;
//! reading the current state and persisting the next one is the caller's
//! responsibility.

use crate::error::{StateError, StateResult};
use crate::types::{EcosystemEvent, EcosystemState};

/// Compute the next state for `(state, event)`.
///
/// Every pair not listed in the diagram is rejected with
/// [`StateError::InvalidTransition`] rather than silently ignored.
pub fn transition(state: EcosystemState, event: EcosystemEvent) -> StateResult<EcosystemState> {
    use EcosystemEvent::*;
    use EcosystemState::*;

    match (state, event) {
        (ProcessingGraph, ProcessingCompleted) => Ok(PendingDeployment),
        (ProcessingGraph, ProcessingFailed) => Ok(Error),
        (PendingDeployment, DeploymentStarted) => Ok(Deploying),
        (PendingDeployment, DeploymentFailed) => Ok(Error),
        (Deploying, DeploymentCompleted) => Ok(Deployed),
        (Deploying, DeploymentFailed) => Ok(Error),
        (state, event) => Err(StateError::InvalidTransition { state, event }),
    }
}
