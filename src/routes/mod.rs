/// Router Module Index
///
/// Splits the gateway's routes by how they are gated. The page and auth API
/// routers sit behind the gate middleware; operational routes do not.

/// Operational routes (health). Never gated.
pub mod public;

/// The auth API boundary: abuse protection in front of the auth service.
pub mod auth_api;

/// Page routes forwarded to the renderer, including the onboarding route and its
/// inner gate.
pub mod pages;
