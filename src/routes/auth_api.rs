use crate::{AppState, handlers};
use axum::{Router, routing::post};

/// Auth API Router Module
///
/// Fronts the auth service. Every POST is evaluated by the abuse shield before it
/// is relayed; GETs are relayed as-is.
pub fn auth_api_routes() -> Router<AppState> {
    Router::new()
        // POST /api/auth/{*action}
        // Sign-up, sign-in, resend-verification, change-email and the rest of the
        // mutating auth flow. Denials are answered with 400/403/429.
        .route(
            "/api/auth/{*action}",
            post(handlers::auth_post).get(handlers::auth_get),
        )
}
