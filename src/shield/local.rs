use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use crate::{
    config::ShieldConfig,
    error::ShieldError,
    shield::{AbuseDecision, AbuseShield, DenyReason, EmailFault, ProtectContext, ShieldRequest},
};

/// Lower-cased fragments that mark a request line as an attack attempt.
const ATTACK_SIGNATURES: &[&str] = &[
    "../",
    "..%2f",
    "%2e%2e",
    "<script",
    "%3cscript",
    "javascript:",
    "/etc/passwd",
    "union select",
    "union%20select",
    "' or '1'='1",
    "%27%20or%20%271%27%3d%271",
];

/// Lower-cased user-agent fragments of automated clients.
const BOT_AGENTS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "curl/",
    "wget/",
    "python-requests",
    "python-urllib",
    "aiohttp",
    "go-http-client",
    "java/",
    "libwww-perl",
    "scrapy",
    "headlesschrome",
    "phantomjs",
];

const DISPOSABLE_DOMAINS: &[&str] = &[
    "10minutemail.com",
    "guerrillamail.com",
    "mailinator.com",
    "maildrop.cc",
    "sharklasers.com",
    "temp-mail.org",
    "tempmail.com",
    "throwawaymail.com",
    "trashmail.com",
    "yopmail.com",
];

const FREE_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "hotmail.com",
    "outlook.com",
    "yahoo.com",
    "icloud.com",
    "aol.com",
    "proton.me",
];

/// Faults blocked when nothing else is configured.
pub const DEFAULT_BLOCKED_EMAIL_FAULTS: &[EmailFault] = &[
    EmailFault::Disposable,
    EmailFault::Invalid,
    EmailFault::NoMxRecords,
];

/// LocalShield
///
/// In-process abuse shield. Rules run in a fixed order and the first match wins:
/// attack signatures, then bots, then email validation, then the rate limit.
/// Domain checks that need DNS (MX records, gravatar) are left to the remote shield.
pub struct LocalShield {
    blocked_email: HashSet<EmailFault>,
    limiter: FixedWindowLimiter,
}

impl LocalShield {
    pub fn new(config: &ShieldConfig) -> Self {
        Self::with_blocked_email(config, DEFAULT_BLOCKED_EMAIL_FAULTS.iter().copied())
    }

    pub fn with_blocked_email(
        config: &ShieldConfig,
        blocked: impl IntoIterator<Item = EmailFault>,
    ) -> Self {
        Self {
            blocked_email: blocked.into_iter().collect(),
            limiter: FixedWindowLimiter::new(config.rate_limit_max, config.rate_limit_window),
        }
    }

    fn email_fault(&self, email: &str) -> Option<EmailFault> {
        let fault = classify_email(email)?;
        self.blocked_email.contains(&fault).then_some(fault)
    }
}

#[async_trait]
impl AbuseShield for LocalShield {
    async fn protect(
        &self,
        request: &ShieldRequest,
        context: &ProtectContext,
    ) -> Result<AbuseDecision, ShieldError> {
        if is_attack(request) {
            tracing::warn!(path = %request.path, ip = %request.ip, "shield rule matched");
            return Ok(AbuseDecision::Denied(DenyReason::ShieldViolation));
        }

        if is_bot(request.user_agent.as_deref()) {
            tracing::warn!(ip = %request.ip, user_agent = ?request.user_agent, "bot detected");
            return Ok(AbuseDecision::Denied(DenyReason::BotDetected));
        }

        if !context.email.is_empty() {
            if let Some(fault) = self.email_fault(&context.email) {
                return Ok(AbuseDecision::Denied(DenyReason::InvalidEmail(fault)));
            }
        }

        if !self.limiter.check(&context.user_id, Instant::now()) {
            tracing::warn!(user_id = %context.user_id, "rate limit exceeded");
            return Ok(AbuseDecision::Denied(DenyReason::RateLimited));
        }

        Ok(AbuseDecision::Allowed)
    }
}

fn is_attack(request: &ShieldRequest) -> bool {
    let line = format!("{}?{}", request.path, request.query).to_ascii_lowercase();
    ATTACK_SIGNATURES
        .iter()
        .any(|signature| line.contains(signature))
}

/// A missing user agent counts as automated.
pub fn is_bot(user_agent: Option<&str>) -> bool {
    match user_agent.map(str::trim) {
        None | Some("") => true,
        Some(agent) => {
            let agent = agent.to_ascii_lowercase();
            BOT_AGENTS.iter().any(|fragment| agent.contains(fragment))
        }
    }
}

/// Offline email classification. `None` means no fault was found.
pub fn classify_email(email: &str) -> Option<EmailFault> {
    let Some((local, domain)) = email.trim().rsplit_once('@') else {
        return Some(EmailFault::Invalid);
    };

    let domain = domain.to_ascii_lowercase();
    let valid_domain = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    let valid_local = !local.is_empty()
        && local.len() <= 64
        && !local.chars().any(|c| c.is_whitespace() || c == '@');

    if !valid_local || !valid_domain {
        return Some(EmailFault::Invalid);
    }

    if DISPOSABLE_DOMAINS.contains(&domain.as_str()) {
        return Some(EmailFault::Disposable);
    }

    if FREE_DOMAINS.contains(&domain.as_str()) {
        return Some(EmailFault::Free);
    }

    None
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// FixedWindowLimiter
///
/// Counts requests per key in fixed windows. Expired windows are pruned once the
/// table grows past `PRUNE_THRESHOLD` keys.
pub struct FixedWindowLimiter {
    max: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

const PRUNE_THRESHOLD: usize = 10_000;

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Records one request for `key` at `now`; returns false when it is over the limit.
    pub fn check(&self, key: &str, now: Instant) -> bool {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if windows.len() > PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max {
            return false;
        }
        entry.count += 1;
        true
    }
}
