use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::{config::Env, error::HeaderStageError};

const DEFAULT_CONTENT_SECURITY_POLICY: &str = "base-uri 'none'; child-src 'none'; \
     connect-src 'self'; default-src 'self'; font-src 'self'; form-action 'self'; \
     frame-ancestors 'none'; frame-src 'none'; img-src 'self' blob: data:; \
     manifest-src 'self'; media-src 'self'; object-src 'none'; script-src 'self'; \
     style-src 'self' 'unsafe-inline'; worker-src 'self'; upgrade-insecure-requests";

/// SecurityHeaderStage
///
/// Best-effort header hardening applied to every gated response. Implementations
/// write into the supplied map; the gate merges it into the outgoing response only
/// when the stage succeeded.
pub trait SecurityHeaderStage: Send + Sync {
    fn apply(&self, headers: &mut HeaderMap) -> Result<(), HeaderStageError>;
}

pub type HeaderStageState = Arc<dyn SecurityHeaderStage>;

/// SecureHeaders
///
/// The default hardened header set. HSTS is only sent in production, where the
/// gateway is always behind TLS.
#[derive(Debug, Clone)]
pub struct SecureHeaders {
    content_security_policy: String,
    strict_transport_security: bool,
}

impl SecureHeaders {
    pub fn new(mode: Env, content_security_policy: Option<String>) -> Self {
        Self {
            content_security_policy: content_security_policy
                .unwrap_or_else(|| DEFAULT_CONTENT_SECURITY_POLICY.to_string()),
            strict_transport_security: mode == Env::Production,
        }
    }
}

impl SecurityHeaderStage for SecureHeaders {
    fn apply(&self, headers: &mut HeaderMap) -> Result<(), HeaderStageError> {
        let csp = HeaderValue::from_str(&self.content_security_policy).map_err(|e| {
            HeaderStageError::InvalidValue {
                name: "content-security-policy",
                reason: e.to_string(),
            }
        })?;
        headers.insert(HeaderName::from_static("content-security-policy"), csp);

        let fixed: &[(&'static str, &'static str)] = &[
            ("cross-origin-embedder-policy", "require-corp"),
            ("cross-origin-opener-policy", "same-origin"),
            ("cross-origin-resource-policy", "same-origin"),
            ("origin-agent-cluster", "?1"),
            ("referrer-policy", "no-referrer"),
            ("x-content-type-options", "nosniff"),
            ("x-dns-prefetch-control", "off"),
            ("x-download-options", "noopen"),
            ("x-frame-options", "SAMEORIGIN"),
            ("x-permitted-cross-domain-policies", "none"),
            ("x-xss-protection", "0"),
        ];
        for (name, value) in fixed {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        if self.strict_transport_security {
            headers.insert(
                HeaderName::from_static("strict-transport-security"),
                HeaderValue::from_static("max-age=31536000; includeSubDomains"),
            );
        }

        Ok(())
    }
}

/// harden
///
/// Failure boundary around the header stage. Errors and panics are logged and
/// swallowed; the caller always gets a map back (empty on failure) and carries on
/// with the request.
pub fn harden(stage: &dyn SecurityHeaderStage) -> HeaderMap {
    let mut staged = HeaderMap::new();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| stage.apply(&mut staged)))
        .unwrap_or(Err(HeaderStageError::Panicked));

    match outcome {
        Ok(()) => staged,
        Err(error) => {
            tracing::error!(%error, "Security header stage error");
            HeaderMap::new()
        }
    }
}
