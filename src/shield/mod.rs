//! Abuse protection for the mutating auth endpoints.
//!
//! The shield itself is an external collaborator ([`AbuseShield`]); this module owns
//! the decision types and the mapping from a decision to an HTTP response.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use async_trait::async_trait;
use axum::{
    extract::ConnectInfo,
    http::{StatusCode, header, request::Parts},
};
use serde::Serialize;
use serde_json::Value;

use crate::error::ShieldError;

pub mod local;
pub mod remote;

pub use local::LocalShield;
pub use remote::RemoteShield;

pub const UNAUTHORIZED_MESSAGE: &str = "You are not authorized to access this resource.";
pub const RATE_LIMITED_MESSAGE: &str =
    "Too many requests, you have been rate limited. Please retry in 5 minutes.";

/// Fallback characteristic when neither a session nor a client address is known.
pub const FALLBACK_CLIENT_IP: &str = "127.0.0.1";

/// EmailFault
///
/// Why an address was refused by email validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmailFault {
    Free,
    Invalid,
    Disposable,
    NoMxRecords,
    NoGravatar,
}

impl EmailFault {
    pub fn message(self) -> &'static str {
        match self {
            EmailFault::Free => "We do not allow free email addresses.",
            EmailFault::Invalid => "Email address format is invalid. Is there a typo?",
            EmailFault::Disposable => "We do not allow disposable email addresses.",
            EmailFault::NoMxRecords => {
                "Your email domain does not have an MX record. Is there a typo?"
            }
            EmailFault::NoGravatar => "We do not accept gravatar email addresses.",
        }
    }

    /// Parses the upper-case wire name used by the decision service.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "FREE" => Some(EmailFault::Free),
            "INVALID" => Some(EmailFault::Invalid),
            "DISPOSABLE" => Some(EmailFault::Disposable),
            "NO_MX_RECORDS" => Some(EmailFault::NoMxRecords),
            "NO_GRAVATAR" => Some(EmailFault::NoGravatar),
            _ => None,
        }
    }
}

/// DenyReason
///
/// Exactly one reason is attached to a denial. `Unclassified` covers reasons the
/// shield reported that this gateway does not recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    ShieldViolation,
    BotDetected,
    RateLimited,
    InvalidEmail(EmailFault),
    Unclassified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseDecision {
    Allowed,
    Denied(DenyReason),
}

/// Dispatch
///
/// What the auth API boundary does with a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Proceed,
    Reject(StatusCode, &'static str),
}

/// dispatch
///
/// Maps a shield decision to the response the auth API returns. Matching is
/// exhaustive, so a new reason cannot be added without choosing its response.
pub fn dispatch(decision: AbuseDecision) -> Dispatch {
    let reason = match decision {
        AbuseDecision::Allowed => return Dispatch::Proceed,
        AbuseDecision::Denied(reason) => reason,
    };

    match reason {
        DenyReason::RateLimited => {
            Dispatch::Reject(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE)
        }
        DenyReason::InvalidEmail(fault) => {
            Dispatch::Reject(StatusCode::BAD_REQUEST, fault.message())
        }
        DenyReason::ShieldViolation | DenyReason::BotDetected | DenyReason::Unclassified => {
            Dispatch::Reject(StatusCode::FORBIDDEN, UNAUTHORIZED_MESSAGE)
        }
    }
}

/// AuthEndpoint
///
/// The auth API endpoints whose body carries an address to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEndpoint {
    SignUp,
    SendVerificationEmail,
    ChangeEmail,
    Other,
}

impl AuthEndpoint {
    /// Accepts either the full request path or the part after `/api/auth`.
    pub fn from_path(path: &str) -> Self {
        let path = crate::gate::classifier::strip_query(path);
        let action = path.strip_prefix("/api/auth").unwrap_or(path);

        if action.starts_with("/sign-up") {
            AuthEndpoint::SignUp
        } else if action.starts_with("/send-verification-email") {
            AuthEndpoint::SendVerificationEmail
        } else if action.starts_with("/change-email") {
            AuthEndpoint::ChangeEmail
        } else {
            AuthEndpoint::Other
        }
    }

    pub fn email_field(self) -> Option<&'static str> {
        match self {
            AuthEndpoint::SignUp | AuthEndpoint::SendVerificationEmail => Some("email"),
            AuthEndpoint::ChangeEmail => Some("newEmail"),
            AuthEndpoint::Other => None,
        }
    }

    /// The address to validate, or an empty string when this endpoint validates none
    /// or the field is not a string.
    pub fn email_from(self, body: &Value) -> String {
        self.email_field()
            .and_then(|field| body.get(field))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// ShieldRequest
///
/// The request fingerprint a shield evaluates.
#[derive(Debug, Clone, Serialize)]
pub struct ShieldRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub ip: String,
    pub user_agent: Option<String>,
}

impl ShieldRequest {
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            ip: client_ip(parts).unwrap_or_else(|| FALLBACK_CLIENT_IP.to_string()),
            user_agent: parts
                .headers
                .get(header::USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        }
    }
}

/// ProtectContext
///
/// Characteristics attached to one shield evaluation. `email` is empty when the
/// endpoint validates no address, which disables the email rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectContext {
    pub user_id: String,
    pub email: String,
}

/// Client address from proxy headers, then the peer address. Header values that do
/// not parse as an IP address are skipped, so callers cannot pick their own key.
pub fn client_ip(parts: &Parts) -> Option<String> {
    let forwarded = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(parse_ip);
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    let real_ip = parts
        .headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(parse_ip);
    if let Some(ip) = real_ip {
        return Some(ip.to_string());
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    raw.trim().parse().ok()
}

/// AbuseShield
///
/// Contract for the bot/abuse protection service.
#[async_trait]
pub trait AbuseShield: Send + Sync {
    async fn protect(
        &self,
        request: &ShieldRequest,
        context: &ProtectContext,
    ) -> Result<AbuseDecision, ShieldError>;
}

pub type ShieldState = Arc<dyn AbuseShield>;
