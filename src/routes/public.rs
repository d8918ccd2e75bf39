use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints that bypass the gate entirely.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers. Returns "ok" without touching any upstream.
        .route("/health", get(handlers::health))
}
