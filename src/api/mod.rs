//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use routes::{create_router, AppState};

/// Build the full application: health check plus the API under `/api/v1`
pub fn build_app(state: AppState) -> Router {
    let api_router = create_router().layer(axum::middleware::from_fn(middleware::logging_middleware));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", api_router)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
