use crate::{AppState, gate, handlers};
use axum::{Router, middleware, routing::any};

/// Pages Router Module
///
/// Everything the page renderer serves. The onboarding route carries its own inner
/// gate; every other path falls through to the renderer.
pub fn page_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // /onboard and its step pages.
        // Completed profiles are sent home, unverified emails to the verification page.
        .route("/onboard", any(handlers::forward_page))
        .route("/onboard/{*step}", any(handlers::forward_page))
        .route_layer(middleware::from_fn_with_state(
            state,
            gate::onboarding_page_gate,
        ))
        .fallback(handlers::forward_page)
}
