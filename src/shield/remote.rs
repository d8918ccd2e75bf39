use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::ShieldError,
    shield::{AbuseDecision, AbuseShield, DenyReason, EmailFault, ProtectContext, ShieldRequest},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Conclusion {
    Allow,
    Deny,
    #[serde(other)]
    Error,
}

/// WireReason
///
/// Reason object as the decision service reports it. Unknown reason types are kept
/// as `Unknown` rather than failing the parse.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireReason {
    Shield,
    Bot,
    RateLimit,
    Email {
        #[serde(default, rename = "emailTypes")]
        email_types: Vec<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WireDecision {
    pub conclusion: Conclusion,
    #[serde(default)]
    pub reason: Option<WireReason>,
}

impl From<WireDecision> for AbuseDecision {
    fn from(wire: WireDecision) -> Self {
        if wire.conclusion != Conclusion::Deny {
            return AbuseDecision::Allowed;
        }

        let reason = match wire.reason {
            Some(WireReason::Shield) => DenyReason::ShieldViolation,
            Some(WireReason::Bot) => DenyReason::BotDetected,
            Some(WireReason::RateLimit) => DenyReason::RateLimited,
            // Only the first reported type is surfaced to the caller.
            Some(WireReason::Email { email_types }) => DenyReason::InvalidEmail(
                email_types
                    .first()
                    .and_then(|name| EmailFault::from_wire(name))
                    .unwrap_or(EmailFault::Invalid),
            ),
            Some(WireReason::Unknown) | None => DenyReason::Unclassified,
        };
        AbuseDecision::Denied(reason)
    }
}

#[derive(Serialize)]
struct DecideRequest<'a> {
    request: &'a ShieldRequest,
    characteristics: &'a ProtectContext,
}

/// RemoteShield
///
/// Client for the hosted decision service. Conclusions other than ALLOW/DENY (the
/// service's own error state) fail open, as the hosted SDK does.
#[derive(Clone)]
pub struct RemoteShield {
    client: reqwest::Client,
    endpoint: String,
    key: Option<String>,
}

impl RemoteShield {
    pub fn new(client: reqwest::Client, base_url: &str, key: Option<String>) -> Self {
        Self {
            client,
            endpoint: format!("{}/v1/decide", base_url.trim_end_matches('/')),
            key,
        }
    }

    pub fn parse_decision(body: &[u8]) -> Result<AbuseDecision, ShieldError> {
        let wire: WireDecision =
            serde_json::from_slice(body).map_err(|e| ShieldError::Malformed(e.to_string()))?;
        if wire.conclusion == Conclusion::Error {
            tracing::warn!("abuse shield reported an error conclusion, allowing request");
        }
        Ok(wire.into())
    }
}

#[async_trait]
impl AbuseShield for RemoteShield {
    async fn protect(
        &self,
        request: &ShieldRequest,
        context: &ProtectContext,
    ) -> Result<AbuseDecision, ShieldError> {
        let mut call = self.client.post(&self.endpoint).json(&DecideRequest {
            request,
            characteristics: context,
        });
        if let Some(key) = &self.key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .map_err(|e| ShieldError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShieldError::UpstreamStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ShieldError::Transport(e.to_string()))?;
        Self::parse_decision(&body)
    }
}
