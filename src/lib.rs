use std::sync::Arc;

use axum::{Router, http::HeaderName, middleware};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod models;
pub mod security_headers;
pub mod shield;
pub mod upstream;

// Routers grouped by how they are gated.
pub mod routes;
use routes::{auth_api, pages, public};

// --- Public Re-exports ---

pub use auth::{HttpSessionResolver, JwtSessionResolver, SessionResolver, SessionState};
pub use config::AppConfig;
pub use gate::{GateMatcher, RouteClassifier};
pub use security_headers::{HeaderStageState, SecureHeaders, SecurityHeaderStage};
pub use shield::{AbuseShield, LocalShield, RemoteShield, ShieldState};
pub use upstream::{HttpUpstream, Upstream, UpstreamState};

/// ApiDoc
///
/// OpenAPI document for the endpoints the gateway answers itself.
/// Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::health, handlers::auth_post),
    components(schemas(models::MessageBody)),
    tags((name = "app-gate", description = "Request gate and auth API boundary"))
)]
struct ApiDoc;

/// AppState
///
/// Shared, immutable container for every collaborator the gate talks to. Nothing in
/// here is mutated per request; the only interior state is the local shield's
/// rate-limit table.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub classifier: Arc<RouteClassifier>,
    pub matcher: GateMatcher,
    pub sessions: SessionState,
    pub shield: ShieldState,
    pub header_stage: HeaderStageState,
    /// The auth service's request handler (`/api/auth/*`).
    pub auth_backend: UpstreamState,
    /// The page renderer.
    pub pages: UpstreamState,
}

impl AppState {
    /// from_config
    ///
    /// Wires the production collaborators described by `config`: local token
    /// verification when a session secret is configured (the auth service otherwise),
    /// the remote shield when a URL is configured (the local shield otherwise).
    pub fn from_config(config: AppConfig, client: reqwest::Client) -> Self {
        let sessions: SessionState = match &config.session_jwt_secret {
            Some(secret) => Arc::new(JwtSessionResolver::new(
                secret,
                config.session_cookie.clone(),
            )),
            None => Arc::new(HttpSessionResolver::new(
                client.clone(),
                &config.auth_service_url,
            )),
        };

        let shield: ShieldState = match &config.shield.remote_url {
            Some(url) => Arc::new(RemoteShield::new(
                client.clone(),
                url,
                config.shield.remote_key.clone(),
            )),
            None => Arc::new(LocalShield::new(&config.shield)),
        };

        Self {
            classifier: Arc::new(RouteClassifier::new(config.public_routes.clone())),
            matcher: GateMatcher,
            sessions,
            shield,
            header_stage: Arc::new(SecureHeaders::new(
                config.env,
                config.content_security_policy.clone(),
            )),
            auth_backend: Arc::new(HttpUpstream::new(client.clone(), &config.auth_service_url)),
            pages: Arc::new(HttpUpstream::new(client, &config.app_upstream_url)),
            config,
        }
    }
}

/// create_router
///
/// Assembles the gateway: operational routes outside the gate, the auth API and
/// page routes behind it, then the observability layers around everything.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // Gated routes. The gate runs before routing reaches any of these handlers,
    // including the fallback.
    let gated = Router::new()
        .merge(auth_api::auth_api_routes())
        .merge(pages::page_routes(state.clone()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::gate_middleware,
        ));

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(gated)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, correlated by the `x-request-id` set above.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
