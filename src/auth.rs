use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::{error::SessionError, models::Session};

/// SessionResolver
///
/// Contract for the external auth service lookup. `Ok(None)` means the request is
/// anonymous; `Err` means the lookup itself failed and the request must not proceed.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, SessionError>;
}

pub type SessionState = Arc<dyn SessionResolver>;

/// resolve_session
///
/// Single awaited lookup bounded by `timeout`. A timeout is reported as a resolver
/// failure, never as "no session".
pub async fn resolve_session(
    resolver: &dyn SessionResolver,
    headers: &HeaderMap,
    timeout: Duration,
) -> Result<Option<Session>, SessionError> {
    match tokio::time::timeout(timeout, resolver.get_session(headers)).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::Timeout(timeout.as_millis())),
    }
}

// --- Auth service lookup ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionUser {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    user_profile_step: Option<String>,
}

#[derive(Deserialize)]
struct SessionEnvelope {
    user: SessionUser,
}

impl From<SessionUser> for Session {
    fn from(user: SessionUser) -> Self {
        Session {
            user_id: user.id,
            email: user.email,
            email_verified: user.email_verified,
            profile_step: user.user_profile_step.unwrap_or_default(),
        }
    }
}

/// HttpSessionResolver
///
/// Asks the auth service's `get-session` endpoint, forwarding the caller's cookie
/// and authorization headers. The service answers `null` for anonymous callers.
#[derive(Clone)]
pub struct HttpSessionResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSessionResolver {
    pub fn new(client: reqwest::Client, auth_service_url: &str) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}/api/auth/get-session",
                auth_service_url.trim_end_matches('/')
            ),
        }
    }

    /// Parses the raw `get-session` body.
    pub fn parse_payload(body: &[u8]) -> Result<Option<Session>, SessionError> {
        let envelope: Option<SessionEnvelope> =
            serde_json::from_slice(body).map_err(|e| SessionError::Malformed(e.to_string()))?;
        Ok(envelope.map(|envelope| envelope.user.into()))
    }
}

#[async_trait]
impl SessionResolver for HttpSessionResolver {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, SessionError> {
        let mut request = self.client.get(&self.endpoint);
        for name in [header::COOKIE, header::AUTHORIZATION] {
            if let Some(value) = headers.get(&name) {
                request = request.header(name, value.clone());
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::UpstreamStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        Self::parse_payload(&body)
    }
}

// --- Local token verification ---

/// SessionClaims
///
/// Payload of a signed session token. Issued by the auth service with the shared
/// secret and checked locally on every request.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// Subject: the user identifier.
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub profile_step: String,
    /// Expiration time. Expired tokens resolve to no session.
    pub exp: usize,
    pub iat: usize,
}

/// JwtSessionResolver
///
/// Resolves the session from an HS256 token carried either as a Bearer credential or
/// in the session cookie. A missing, malformed or expired token is an anonymous
/// caller, not a failure.
#[derive(Clone)]
pub struct JwtSessionResolver {
    decoding_key: DecodingKey,
    cookie_name: String,
}

impl JwtSessionResolver {
    pub fn new(secret: &str, cookie_name: impl Into<String>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            cookie_name: cookie_name.into(),
        }
    }

    fn token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        if bearer.is_some() {
            return bearer;
        }

        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|raw| raw.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value)
    }
}

#[async_trait]
impl SessionResolver for JwtSessionResolver {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, SessionError> {
        let Some(token) = self.token(headers) else {
            return Ok(None);
        };

        let mut validation = Validation::default();
        validation.validate_exp = true;

        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(Some(Session {
                user_id: data.claims.sub,
                email: data.claims.email,
                email_verified: data.claims.email_verified,
                profile_step: data.claims.profile_step,
            })),
            Err(e) => {
                tracing::debug!(error = %e, "session token rejected");
                Ok(None)
            }
        }
    }
}
