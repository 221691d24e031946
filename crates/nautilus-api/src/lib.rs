//! nautilus-api: read-only REST API over reconciled cluster state.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/clusters` | List registered cluster specs |
//! | GET | `/api/v1/clusters/{id}` | Get one cluster spec |
//! | GET | `/api/v1/clusters/{id}/status` | Last reconciled status |
//! | GET | `/api/v1/clusters/{id}/events` | Recent status events (`?limit=N`) |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use nautilus_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
}

/// Build the API router.
pub fn build_router(store: StateStore) -> Router {
    let api_state = ApiState { store };

    let api_routes = Router::new()
        .route("/clusters", get(handlers::list_clusters))
        .route("/clusters/{id}", get(handlers::get_cluster))
        .route("/clusters/{id}/status", get(handlers::get_status))
        .route("/clusters/{id}/events", get(handlers::list_events))
        .with_state(api_state);

    Router::new().nest("/api/v1", api_routes)
}
