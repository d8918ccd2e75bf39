use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::{
    AppState,
    auth::resolve_session,
    error::GateError,
    gate::ResolvedSession,
    models::{MessageBody, Session},
    shield::{AuthEndpoint, Dispatch, ProtectContext, ShieldRequest, dispatch},
    upstream::MAX_FORWARD_BODY,
};

/// health
///
/// Liveness probe for load balancers. Not gated.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

/// auth_post
///
/// [Abuse-protected] Mutating auth API calls (sign-up, sign-in, email changes...).
/// The request is evaluated by the abuse shield first; denials are answered here
/// and never reach the auth service. Any failure along the way is a generic 500.
#[utoipa::path(
    post,
    path = "/api/auth/{action}",
    params(("action" = String, Path, description = "Auth service action, e.g. `sign-up/email`")),
    responses(
        (status = 200, description = "Relayed auth service response"),
        (status = 400, description = "Email address refused", body = MessageBody),
        (status = 403, description = "Request blocked", body = MessageBody),
        (status = 429, description = "Rate limited", body = MessageBody),
        (status = 500, description = "Internal error", body = MessageBody)
    )
)]
pub async fn auth_post(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, GateError> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_FORWARD_BODY)
        .await
        .map_err(|e| GateError::Body(e.to_string()))?;

    let payload: Value = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&bytes).map_err(|e| GateError::MalformedJson(e.to_string()))?
    };

    let session = session_for(&state, &parts).await?;
    let endpoint = AuthEndpoint::from_path(parts.uri.path());
    let shield_request = ShieldRequest::from_parts(&parts);
    let context = ProtectContext {
        user_id: session
            .map(|session| session.user_id)
            .unwrap_or_else(|| shield_request.ip.clone()),
        email: endpoint.email_from(&payload),
    };

    let decision = state.shield.protect(&shield_request, &context).await?;
    tracing::debug!(?endpoint, ?decision, "auth request evaluated");

    if let Dispatch::Reject(status, message) = dispatch(decision) {
        tracing::info!(
            path = %shield_request.path,
            status = status.as_u16(),
            "auth request denied"
        );
        return Ok((status, Json(MessageBody::new(message))).into_response());
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(state.auth_backend.forward(request).await?)
}

/// auth_get
///
/// Read-only auth API calls (session lookups, OAuth callbacks) go straight to the
/// auth service.
pub async fn auth_get(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, GateError> {
    Ok(state.auth_backend.forward(request).await?)
}

/// forward_page
///
/// Hands a request the gate let through to the page renderer.
pub async fn forward_page(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, GateError> {
    Ok(state.pages.forward(request).await?)
}

/// Reuses the session the gate already resolved for this request, if any.
async fn session_for(state: &AppState, parts: &Parts) -> Result<Option<Session>, GateError> {
    if let Some(ResolvedSession(session)) = parts.extensions.get::<ResolvedSession>() {
        return Ok(session.clone());
    }
    Ok(resolve_session(
        state.sessions.as_ref(),
        &parts.headers,
        state.config.session_timeout,
    )
    .await?)
}
