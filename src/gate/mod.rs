//! Request gating: path classification, the decision table, and the axum
//! middleware that applies them ahead of every page and API handler.

/// Pure path classification and the static-asset matcher.
pub mod classifier;

/// The decision table (`RouteClass` x session state -> `GateDecision`).
pub mod decision;

/// The middleware functions wired into the router.
pub mod middleware;

pub use classifier::{GateMatcher, RouteClass, RouteClassifier};
pub use decision::{GateDecision, GateScope, OnboardingState, decide, onboarding_transition};
pub use middleware::{ResolvedSession, gate_middleware, onboarding_page_gate};
