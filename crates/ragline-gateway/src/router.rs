use axum::Router;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, ingest_handler, job_handler, query_handler};
use super::server::AppState;

/// Routes for both triggers plus job inspection and health.
pub fn build_router(state: AppState, max_body_size: usize) -> Router {
    Router::new()
        .route("/ingest", post(ingest_handler))
        .route("/query", post(query_handler))
        .route("/jobs/{job_id}", get(job_handler))
        .route("/health", get(health_handler))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
