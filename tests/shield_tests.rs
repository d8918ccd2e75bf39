use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use app_gate::{
    config::ShieldConfig,
    error::ShieldError,
    shield::{
        AbuseDecision, AbuseShield, AuthEndpoint, DenyReason, Dispatch, EmailFault, LocalShield,
        ProtectContext, RATE_LIMITED_MESSAGE, RemoteShield, ShieldRequest, UNAUTHORIZED_MESSAGE,
        client_ip, dispatch,
        local::{FixedWindowLimiter, classify_email, is_bot},
    },
};
use axum::{
    extract::ConnectInfo,
    http::{Request, StatusCode, request::Parts},
};
use serde_json::json;

// --- Dispatch table ---

#[test]
fn test_allowed_proceeds() {
    assert_eq!(dispatch(AbuseDecision::Allowed), Dispatch::Proceed);
}

#[test]
fn test_denial_status_codes() {
    let cases = [
        (DenyReason::ShieldViolation, StatusCode::FORBIDDEN, UNAUTHORIZED_MESSAGE),
        (DenyReason::BotDetected, StatusCode::FORBIDDEN, UNAUTHORIZED_MESSAGE),
        (DenyReason::Unclassified, StatusCode::FORBIDDEN, UNAUTHORIZED_MESSAGE),
        (DenyReason::RateLimited, StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE),
    ];
    for (reason, status, message) in cases {
        assert_eq!(
            dispatch(AbuseDecision::Denied(reason)),
            Dispatch::Reject(status, message)
        );
    }
}

#[test]
fn test_email_fault_messages() {
    let cases = [
        (EmailFault::Free, "We do not allow free email addresses."),
        (EmailFault::Invalid, "Email address format is invalid. Is there a typo?"),
        (EmailFault::Disposable, "We do not allow disposable email addresses."),
        (
            EmailFault::NoMxRecords,
            "Your email domain does not have an MX record. Is there a typo?",
        ),
        (EmailFault::NoGravatar, "We do not accept gravatar email addresses."),
    ];
    for (fault, message) in cases {
        assert_eq!(
            dispatch(AbuseDecision::Denied(DenyReason::InvalidEmail(fault))),
            Dispatch::Reject(StatusCode::BAD_REQUEST, message)
        );
    }
}

// --- Email field selection ---

#[test]
fn test_auth_endpoint_from_path() {
    assert_eq!(AuthEndpoint::from_path("/api/auth/sign-up/email"), AuthEndpoint::SignUp);
    assert_eq!(
        AuthEndpoint::from_path("/api/auth/send-verification-email"),
        AuthEndpoint::SendVerificationEmail
    );
    assert_eq!(AuthEndpoint::from_path("/api/auth/change-email"), AuthEndpoint::ChangeEmail);
    assert_eq!(AuthEndpoint::from_path("/api/auth/sign-in/email"), AuthEndpoint::Other);
    assert_eq!(AuthEndpoint::from_path("/sign-up/email?x=1"), AuthEndpoint::SignUp);
}

#[test]
fn test_email_from_body() {
    let body = json!({"email": "a@example.com", "newEmail": "b@example.com"});
    assert_eq!(AuthEndpoint::SignUp.email_from(&body), "a@example.com");
    assert_eq!(AuthEndpoint::SendVerificationEmail.email_from(&body), "a@example.com");
    assert_eq!(AuthEndpoint::ChangeEmail.email_from(&body), "b@example.com");
    assert_eq!(AuthEndpoint::Other.email_from(&body), "");

    assert_eq!(AuthEndpoint::SignUp.email_from(&json!({"email": 42})), "");
    assert_eq!(AuthEndpoint::SignUp.email_from(&json!([])), "");
}

// --- Remote decision parsing ---

#[test]
fn test_parse_remote_decisions() {
    let cases = [
        (r#"{"conclusion":"ALLOW"}"#, AbuseDecision::Allowed),
        (
            r#"{"conclusion":"DENY","reason":{"type":"SHIELD"}}"#,
            AbuseDecision::Denied(DenyReason::ShieldViolation),
        ),
        (
            r#"{"conclusion":"DENY","reason":{"type":"BOT","denied":["CURL"]}}"#,
            AbuseDecision::Denied(DenyReason::BotDetected),
        ),
        (
            r#"{"conclusion":"DENY","reason":{"type":"RATE_LIMIT","max":5}}"#,
            AbuseDecision::Denied(DenyReason::RateLimited),
        ),
        (
            r#"{"conclusion":"DENY","reason":{"type":"EMAIL","emailTypes":["DISPOSABLE","INVALID"]}}"#,
            AbuseDecision::Denied(DenyReason::InvalidEmail(EmailFault::Disposable)),
        ),
        (
            r#"{"conclusion":"DENY","reason":{"type":"EMAIL","emailTypes":["NO_MX_RECORDS"]}}"#,
            AbuseDecision::Denied(DenyReason::InvalidEmail(EmailFault::NoMxRecords)),
        ),
    ];
    for (raw, expected) in cases {
        assert_eq!(RemoteShield::parse_decision(raw.as_bytes()).unwrap(), expected, "{raw}");
    }
}

#[test]
fn test_unrecognised_reasons_do_not_fail_the_parse() {
    let unknown = RemoteShield::parse_decision(
        br#"{"conclusion":"DENY","reason":{"type":"SENSITIVE_INFO"}}"#,
    )
    .unwrap();
    assert_eq!(unknown, AbuseDecision::Denied(DenyReason::Unclassified));

    let missing = RemoteShield::parse_decision(br#"{"conclusion":"DENY"}"#).unwrap();
    assert_eq!(missing, AbuseDecision::Denied(DenyReason::Unclassified));

    let odd_email = RemoteShield::parse_decision(
        br#"{"conclusion":"DENY","reason":{"type":"EMAIL","emailTypes":["SOMETHING_NEW"]}}"#,
    )
    .unwrap();
    assert_eq!(
        odd_email,
        AbuseDecision::Denied(DenyReason::InvalidEmail(EmailFault::Invalid))
    );
}

#[test]
fn test_error_conclusion_fails_open() {
    let decision = RemoteShield::parse_decision(br#"{"conclusion":"ERROR"}"#).unwrap();
    assert_eq!(decision, AbuseDecision::Allowed);
}

#[test]
fn test_malformed_remote_payload_is_an_error() {
    let result = RemoteShield::parse_decision(b"<html>bad gateway</html>");
    assert!(matches!(result, Err(ShieldError::Malformed(_))));
}

// --- Local shield ---

fn request(path: &str, query: &str, user_agent: Option<&str>) -> ShieldRequest {
    ShieldRequest {
        method: "POST".to_string(),
        path: path.to_string(),
        query: query.to_string(),
        ip: "198.51.100.1".to_string(),
        user_agent: user_agent.map(str::to_string),
    }
}

fn browser(path: &str) -> ShieldRequest {
    request(path, "", Some("Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0)"))
}

fn context(user_id: &str, email: &str) -> ProtectContext {
    ProtectContext {
        user_id: user_id.to_string(),
        email: email.to_string(),
    }
}

#[tokio::test]
async fn test_local_shield_allows_clean_signup() {
    let shield = LocalShield::new(&ShieldConfig::default());
    let decision = shield
        .protect(&browser("/api/auth/sign-up/email"), &context("ip-1", "jane@example.com"))
        .await
        .unwrap();
    assert_eq!(decision, AbuseDecision::Allowed);
}

#[tokio::test]
async fn test_local_shield_blocks_attack_signatures() {
    let shield = LocalShield::new(&ShieldConfig::default());
    let req = request(
        "/api/auth/sign-in/email",
        "next=../../etc/passwd",
        Some("Mozilla/5.0"),
    );
    let decision = shield.protect(&req, &context("ip-1", "")).await.unwrap();
    assert_eq!(decision, AbuseDecision::Denied(DenyReason::ShieldViolation));
}

#[tokio::test]
async fn test_local_shield_blocks_bots() {
    let shield = LocalShield::new(&ShieldConfig::default());
    for agent in [None, Some("curl/8.4.0"), Some("python-requests/2.31")] {
        let decision = shield
            .protect(&request("/api/auth/sign-up/email", "", agent), &context("ip-1", ""))
            .await
            .unwrap();
        assert_eq!(decision, AbuseDecision::Denied(DenyReason::BotDetected), "{agent:?}");
    }
}

#[tokio::test]
async fn test_local_shield_email_rules() {
    let shield = LocalShield::new(&ShieldConfig::default());

    let disposable = shield
        .protect(&browser("/api/auth/sign-up/email"), &context("ip-1", "x@mailinator.com"))
        .await
        .unwrap();
    assert_eq!(
        disposable,
        AbuseDecision::Denied(DenyReason::InvalidEmail(EmailFault::Disposable))
    );

    let invalid = shield
        .protect(&browser("/api/auth/sign-up/email"), &context("ip-2", "not-an-email"))
        .await
        .unwrap();
    assert_eq!(invalid, AbuseDecision::Denied(DenyReason::InvalidEmail(EmailFault::Invalid)));

    // Free providers are not blocked unless configured.
    let free = shield
        .protect(&browser("/api/auth/sign-up/email"), &context("ip-3", "jane@gmail.com"))
        .await
        .unwrap();
    assert_eq!(free, AbuseDecision::Allowed);
}

#[tokio::test]
async fn test_local_shield_blocks_free_email_when_configured() {
    let shield = LocalShield::with_blocked_email(&ShieldConfig::default(), [EmailFault::Free]);
    let decision = shield
        .protect(&browser("/api/auth/sign-up/email"), &context("ip-1", "jane@gmail.com"))
        .await
        .unwrap();
    assert_eq!(decision, AbuseDecision::Denied(DenyReason::InvalidEmail(EmailFault::Free)));
}

#[tokio::test]
async fn test_local_shield_rate_limits_per_characteristic() {
    let shield = LocalShield::new(&ShieldConfig::default());
    let req = browser("/api/auth/sign-in/email");

    for attempt in 1..=5 {
        let decision = shield.protect(&req, &context("ip-1", "")).await.unwrap();
        assert_eq!(decision, AbuseDecision::Allowed, "attempt {attempt}");
    }

    let sixth = shield.protect(&req, &context("ip-1", "")).await.unwrap();
    assert_eq!(sixth, AbuseDecision::Denied(DenyReason::RateLimited));

    // Another caller has its own window.
    let other = shield.protect(&req, &context("ip-2", "")).await.unwrap();
    assert_eq!(other, AbuseDecision::Allowed);
}

#[test]
fn test_fixed_window_resets() {
    let limiter = FixedWindowLimiter::new(2, Duration::from_secs(60));
    let start = Instant::now();

    assert!(limiter.check("k", start));
    assert!(limiter.check("k", start + Duration::from_secs(1)));
    assert!(!limiter.check("k", start + Duration::from_secs(2)));
    assert!(limiter.check("k", start + Duration::from_secs(61)));
}

#[test]
fn test_classify_email() {
    assert_eq!(classify_email("jane@example.com"), None);
    assert_eq!(classify_email("jane.doe+tag@sub.example.co.uk"), None);
    assert_eq!(classify_email("jane"), Some(EmailFault::Invalid));
    assert_eq!(classify_email("@example.com"), Some(EmailFault::Invalid));
    assert_eq!(classify_email("jane@localhost"), Some(EmailFault::Invalid));
    assert_eq!(classify_email("jane@exa mple.com"), Some(EmailFault::Invalid));
    assert_eq!(classify_email("jane@example..com"), Some(EmailFault::Invalid));
    assert_eq!(classify_email("x@YOPMAIL.com"), Some(EmailFault::Disposable));
    assert_eq!(classify_email("x@outlook.com"), Some(EmailFault::Free));
}

#[test]
fn test_is_bot() {
    assert!(is_bot(None));
    assert!(is_bot(Some("  ")));
    assert!(is_bot(Some("Googlebot/2.1 (+http://www.google.com/bot.html)")));
    assert!(!is_bot(Some(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36"
    )));
}

// --- Client address ---

fn parts_with(headers: &[(&str, &str)]) -> Parts {
    let mut builder = Request::builder().uri("/api/auth/sign-in/email");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(()).unwrap().into_parts().0
}

#[test]
fn test_client_ip_prefers_forwarded_for() {
    let parts = parts_with(&[
        ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
        ("x-real-ip", "198.51.100.2"),
    ]);
    assert_eq!(client_ip(&parts).as_deref(), Some("203.0.113.7"));
}

#[test]
fn test_client_ip_skips_values_that_are_not_addresses() {
    let parts = parts_with(&[
        ("x-forwarded-for", "not-an-ip-1"),
        ("x-real-ip", "2001:db8::1"),
    ]);
    assert_eq!(client_ip(&parts).as_deref(), Some("2001:db8::1"));

    let parts = parts_with(&[("x-forwarded-for", "junk"), ("x-real-ip", "also junk")]);
    assert_eq!(client_ip(&parts), None);
    assert_eq!(ShieldRequest::from_parts(&parts).ip, "127.0.0.1");
}

#[test]
fn test_client_ip_falls_back_to_peer_address() {
    let mut parts = parts_with(&[("x-forwarded-for", "unknown")]);
    parts
        .extensions
        .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 51234))));
    assert_eq!(client_ip(&parts).as_deref(), Some("192.0.2.10"));
}
