//! REST API handlers.
//!
//! Each handler delegates to the pipelines or the store and returns JSON
//! responses.

use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use fanout_pipeline::{PipelineError, SubmitRequest};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Auth ───────────────────────────────────────────────────────

/// Static bearer check applied to mutating routes.
pub async fn require_bearer(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.auth_token else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == expected)
        .unwrap_or(false);

    if authorized {
        next.run(request).await
    } else {
        error_response("unauthorized", StatusCode::UNAUTHORIZED).into_response()
    }
}

// ── Ecosystems ─────────────────────────────────────────────────

/// POST /api/v1/ecosystems
pub async fn create_ecosystem(
    State(state): State<ApiState>,
    Json(request): Json<SubmitRequest>,
) -> impl IntoResponse {
    match state.create.submit(request).await {
        Ok(id) => (
            StatusCode::CREATED,
            ApiResponse::ok(serde_json::json!({ "id": id })),
        )
            .into_response(),
        Err(PipelineError::Validation(messages)) => {
            error_response(&messages.join("; "), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/ecosystems
pub async fn list_ecosystems(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_ecosystems() {
        Ok(ecosystems) => ApiResponse::ok(ecosystems).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/ecosystems/:id
pub async fn get_ecosystem(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let ecosystem = match state.store.get_ecosystem(id) {
        Ok(Some(ecosystem)) => ecosystem,
        Ok(None) => {
            return error_response("ecosystem not found", StatusCode::NOT_FOUND).into_response();
        }
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };

    // The verified graph is empty until processing completes.
    let nodes = state.store.list_nodes(id).unwrap_or_default();
    let edges = state.store.list_edges(id).unwrap_or_default();

    ApiResponse::ok(serde_json::json!({
        "ecosystem": ecosystem,
        "nodes": nodes,
        "edges": edges,
    }))
    .into_response()
}

/// DELETE /api/v1/ecosystems/:id
pub async fn delete_ecosystem(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.soft_delete(id) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("ecosystem not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Deployment ─────────────────────────────────────────────────

/// POST /api/v1/ecosystems/:id/deploy
pub async fn deploy_ecosystem(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.deploy.deploy(id).await {
        Ok(()) => ApiResponse::ok(serde_json::json!({
            "id": id,
            "status": "deploying",
        }))
        .into_response(),
        Err(PipelineError::NotFound(_)) => {
            error_response("ecosystem not found", StatusCode::NOT_FOUND).into_response()
        }
        Err(e @ PipelineError::WrongState { .. }) => {
            error_response(&e.to_string(), StatusCode::CONFLICT).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
