use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::MessageBody;

/// Failure of the upstream session lookup.
///
/// Every variant is fatal to the request: an unresolved session must never be
/// read as "anonymous", so these surface as a 500 rather than a silent allow.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session service returned status {0}")]
    UpstreamStatus(u16),
    #[error("session service unreachable: {0}")]
    Transport(String),
    #[error("session lookup timed out after {0} ms")]
    Timeout(u128),
    #[error("malformed session payload: {0}")]
    Malformed(String),
}

/// Failure while asking the abuse shield for a decision.
#[derive(Debug, Error)]
pub enum ShieldError {
    #[error("abuse shield returned status {0}")]
    UpstreamStatus(u16),
    #[error("abuse shield unreachable: {0}")]
    Transport(String),
    #[error("malformed abuse decision: {0}")]
    Malformed(String),
}

/// Failure while forwarding a request to the auth service or page renderer.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request could not be built: {0}")]
    Request(String),
    #[error("upstream unreachable: {0}")]
    Transport(String),
    #[error("upstream response could not be relayed: {0}")]
    Response(String),
}

/// Failure inside the header-hardening stage. Never reaches the client.
#[derive(Debug, Error)]
pub enum HeaderStageError {
    #[error("invalid value for header {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
    #[error("header stage panicked")]
    Panicked,
}

/// GateError
///
/// Aggregates every failure that is fatal to a gated request. All of them are
/// rendered as the same generic 500 body so no decision detail leaks to the client.
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Shield(#[from] ShieldError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("request body could not be read: {0}")]
    Body(String),
    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),
}

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed inside the gate");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(MessageBody::new(INTERNAL_ERROR_MESSAGE)),
        )
            .into_response()
    }
}
