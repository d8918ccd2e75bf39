use crate::{config::Env, gate::classifier::RouteClass, models::Session};

pub const HOME_PATH: &str = "/";
pub const SIGN_IN_PATH: &str = "/auth/sign-in";
pub const VERIFY_EMAIL_PATH: &str = "/auth/verify-email";

/// GateDecision
///
/// Outcome of one gate evaluation. Produced fresh per request and never cached,
/// since the session can change between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Continue,
    RedirectTo(&'static str),
}

/// OnboardingState
///
/// What the gate knows about the caller, collapsed from the optional session.
/// A completed profile wins over an unverified email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingState {
    Anonymous,
    Unverified,
    Incomplete,
    Completed,
}

impl OnboardingState {
    pub fn of(session: Option<&Session>) -> Self {
        match session {
            None => Self::Anonymous,
            Some(session) if session.has_completed_profile() => Self::Completed,
            Some(session) if !session.email_verified => Self::Unverified,
            Some(_) => Self::Incomplete,
        }
    }
}

/// GateScope
///
/// The two places the onboarding route is inspected: the top-level middleware
/// (`Edge`) and the gate mounted on the onboarding route itself (`Page`), which
/// runs only after the edge let the request through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateScope {
    Edge,
    Page,
}

/// Single transition table for the onboarding route, shared by both scopes.
pub fn onboarding_transition(state: OnboardingState, scope: GateScope) -> GateDecision {
    match (state, scope) {
        (OnboardingState::Completed, _) => GateDecision::RedirectTo(HOME_PATH),
        (OnboardingState::Unverified, GateScope::Page) => {
            GateDecision::RedirectTo(VERIFY_EMAIL_PATH)
        }
        (OnboardingState::Unverified, GateScope::Edge)
        | (OnboardingState::Anonymous, _)
        | (OnboardingState::Incomplete, _) => GateDecision::Continue,
    }
}

/// decide
///
/// The top-level gate: a pure function of the route class, the resolved session
/// and the injected runtime mode.
///
/// The mode does not change any transition. Sending anonymous callers outside `/`
/// to sign-in in production is already the `Protected` rule once public prefixes
/// are honoured.
pub fn decide(class: RouteClass, session: Option<&Session>, mode: Env) -> GateDecision {
    let state = OnboardingState::of(session);

    let decision = match class {
        RouteClass::Onboarding => onboarding_transition(state, GateScope::Edge),
        RouteClass::Public => GateDecision::Continue,
        RouteClass::Protected => match state {
            OnboardingState::Anonymous => GateDecision::RedirectTo(SIGN_IN_PATH),
            _ => GateDecision::Continue,
        },
    };

    tracing::debug!(?class, ?state, ?mode, ?decision, "gate decision");
    decision
}
