use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    AppState,
    auth::resolve_session,
    error::GateError,
    gate::decision::{GateDecision, GateScope, OnboardingState, decide, onboarding_transition},
    models::Session,
    security_headers::harden,
};

/// ResolvedSession
///
/// The session the gate resolved, attached to requests it let through so inner
/// gates and handlers do not ask the auth service a second time.
#[derive(Debug, Clone)]
pub struct ResolvedSession(pub Option<Session>);

fn redirect(target: &'static str) -> Response {
    Redirect::temporary(target).into_response()
}

/// gate_middleware
///
/// The per-request gate, run ahead of every page and API handler:
/// header hardening (fail-open), session lookup (fail-closed), classification,
/// then the decision. Redirects are 307s. Hardened headers are attached to both
/// outcomes.
pub async fn gate_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, GateError> {
    let path = request.uri().path().to_string();
    if !state.matcher.is_gated(&path) {
        return Ok(next.run(request).await);
    }

    let hardened = harden(state.header_stage.as_ref());

    let session = resolve_session(
        state.sessions.as_ref(),
        request.headers(),
        state.config.session_timeout,
    )
    .await?;

    let class = state.classifier.classify(&path);

    let mut response = match decide(class, session.as_ref(), state.config.env) {
        GateDecision::Continue => {
            request.extensions_mut().insert(ResolvedSession(session));
            next.run(request).await
        }
        GateDecision::RedirectTo(target) => {
            tracing::info!(%path, %target, "gate redirect");
            redirect(target)
        }
    };

    response.headers_mut().extend(hardened);
    Ok(response)
}

/// onboarding_page_gate
///
/// Second gate mounted on the onboarding route itself. Besides the edge rule it
/// sends callers with an unverified email to the verification page.
pub async fn onboarding_page_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GateError> {
    let session = match request.extensions().get::<ResolvedSession>() {
        Some(ResolvedSession(session)) => session.clone(),
        None => {
            resolve_session(
                state.sessions.as_ref(),
                request.headers(),
                state.config.session_timeout,
            )
            .await?
        }
    };

    match onboarding_transition(OnboardingState::of(session.as_ref()), GateScope::Page) {
        GateDecision::Continue => Ok(next.run(request).await),
        GateDecision::RedirectTo(target) => Ok(redirect(target)),
    }
}
