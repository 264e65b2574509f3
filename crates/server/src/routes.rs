//! Route configuration.

use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/file", post(handlers::ingest_file))
        .route("/url", post(handlers::ingest_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
