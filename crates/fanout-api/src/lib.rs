//! fanout-api — REST API for the fanout service.
//!
//! Provides axum route handlers for submitting ecosystems and starting
//! deployments. Mutating routes require the static bearer token when one
//! is configured.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/ecosystems` | Submit an ecosystem graph |
//! | GET | `/api/v1/ecosystems` | List ecosystems |
//! | GET | `/api/v1/ecosystems/:id` | Get an ecosystem with its graph |
//! | DELETE | `/api/v1/ecosystems/:id` | Soft-delete an ecosystem |
//! | POST | `/api/v1/ecosystems/:id/deploy` | Start deployment |

pub mod handlers;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};

use fanout_pipeline::{CreationPipeline, DeploymentPipeline};
use fanout_state::EcosystemStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: EcosystemStore,
    pub create: CreationPipeline,
    pub deploy: DeploymentPipeline,
    /// Bearer token required on mutating routes; `None` disables auth.
    pub auth_token: Option<String>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let reads = Router::new()
        .route("/ecosystems", get(handlers::list_ecosystems))
        .route("/ecosystems/{id}", get(handlers::get_ecosystem));

    let writes = Router::new()
        .route("/ecosystems", post(handlers::create_ecosystem))
        .route("/ecosystems/{id}", delete(handlers::delete_ecosystem))
        .route("/ecosystems/{id}/deploy", post(handlers::deploy_ecosystem))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_bearer,
        ));

    Router::new().nest("/api/v1", reads.merge(writes).with_state(state))
}
