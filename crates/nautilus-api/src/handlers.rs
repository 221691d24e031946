//! REST API handlers.
//!
//! Each handler reads via `StateStore` and returns JSON responses.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::warn;

use nautilus_state::StateError;

use crate::ApiState;

/// Events returned when no `limit` is given.
pub const DEFAULT_EVENT_LIMIT: usize = 50;
/// Upper bound on `limit`.
pub const MAX_EVENT_LIMIT: usize = 1000;

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

fn store_error(e: StateError) -> axum::response::Response {
    warn!(error = %e, "state store read failed");
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

fn cluster_not_found() -> axum::response::Response {
    error_response("cluster not found", StatusCode::NOT_FOUND).into_response()
}

// ── Clusters ───────────────────────────────────────────────────

/// GET /api/v1/clusters
pub async fn list_clusters(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_clusters() {
        Ok(clusters) => ApiResponse::ok(clusters).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /api/v1/clusters/{id}
pub async fn get_cluster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_cluster(&id) {
        Ok(Some(spec)) => ApiResponse::ok(spec).into_response(),
        Ok(None) => cluster_not_found(),
        Err(e) => store_error(e),
    }
}

// ── Status ─────────────────────────────────────────────────────

/// GET /api/v1/clusters/{id}/status
///
/// 404 until the first pass has written a status.
pub async fn get_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_stored_status(&id) {
        Ok(Some(stored)) => ApiResponse::ok(stored).into_response(),
        Ok(None) => match state.store.get_cluster(&id) {
            Ok(Some(_)) => {
                error_response("cluster not yet reconciled", StatusCode::NOT_FOUND).into_response()
            }
            Ok(None) => cluster_not_found(),
            Err(e) => store_error(e),
        },
        Err(e) => store_error(e),
    }
}

// ── Events ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/clusters/{id}/events
pub async fn list_events(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .min(MAX_EVENT_LIMIT);

    match state.store.list_events(&id, limit) {
        Ok(events) => ApiResponse::ok(events).into_response(),
        Err(e) => store_error(e),
    }
}
