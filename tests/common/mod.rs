#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use app_gate::{
    AppConfig, AppState, GateMatcher, RouteClassifier,
    error::{HeaderStageError, SessionError, ShieldError, UpstreamError},
    models::Session,
    security_headers::{SecureHeaders, SecurityHeaderStage},
    shield::{AbuseDecision, AbuseShield, ProtectContext, ShieldRequest},
    upstream::Upstream,
    auth::SessionResolver,
};
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use tower::ServiceExt;

// --- Session resolver mock ---

#[derive(Clone)]
pub enum SessionBehaviour {
    Anonymous,
    User(Session),
    Fail,
    Hang,
}

pub struct MockSessions {
    behaviour: SessionBehaviour,
    pub calls: AtomicUsize,
}

impl MockSessions {
    pub fn new(behaviour: SessionBehaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionResolver for MockSessions {
    async fn get_session(&self, _headers: &HeaderMap) -> Result<Option<Session>, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            SessionBehaviour::Anonymous => Ok(None),
            SessionBehaviour::User(session) => Ok(Some(session.clone())),
            SessionBehaviour::Fail => Err(SessionError::UpstreamStatus(502)),
            SessionBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(None)
            }
        }
    }
}

pub fn session(profile_step: &str, email_verified: bool) -> Session {
    Session {
        user_id: "user_123".to_string(),
        email: "member@example.com".to_string(),
        email_verified,
        profile_step: profile_step.to_string(),
    }
}

// --- Abuse shield mock ---

pub struct MockShield {
    decision: Result<AbuseDecision, ()>,
    pub last_context: Mutex<Option<ProtectContext>>,
    pub last_request: Mutex<Option<ShieldRequest>>,
}

impl MockShield {
    pub fn returning(decision: AbuseDecision) -> Self {
        Self {
            decision: Ok(decision),
            last_context: Mutex::new(None),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            decision: Err(()),
            last_context: Mutex::new(None),
            last_request: Mutex::new(None),
        }
    }

    pub fn context(&self) -> Option<ProtectContext> {
        self.last_context.lock().unwrap().clone()
    }
}

#[async_trait]
impl AbuseShield for MockShield {
    async fn protect(
        &self,
        request: &ShieldRequest,
        context: &ProtectContext,
    ) -> Result<AbuseDecision, ShieldError> {
        *self.last_context.lock().unwrap() = Some(context.clone());
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.decision
            .map_err(|_| ShieldError::Transport("connection refused".to_string()))
    }
}

// --- Upstream mock ---

pub struct MockUpstream {
    label: &'static str,
    fail: bool,
    pub seen: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockUpstream {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            fail: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(label: &'static str) -> Self {
        Self {
            label,
            fail: true,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, Vec<u8>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn forward(&self, request: Request) -> Result<Response, UpstreamError> {
        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        self.seen
            .lock()
            .unwrap()
            .push((parts.uri.to_string(), bytes.to_vec()));

        if self.fail {
            return Err(UpstreamError::Transport("connection reset".to_string()));
        }
        Ok(Response::new(Body::from(self.label)))
    }
}

// --- Header stage mocks ---

pub struct FailingHeaders;

impl SecurityHeaderStage for FailingHeaders {
    fn apply(&self, _headers: &mut HeaderMap) -> Result<(), HeaderStageError> {
        Err(HeaderStageError::InvalidValue {
            name: "content-security-policy",
            reason: "library outage".to_string(),
        })
    }
}

pub struct PanickingHeaders;

impl SecurityHeaderStage for PanickingHeaders {
    fn apply(&self, _headers: &mut HeaderMap) -> Result<(), HeaderStageError> {
        panic!("header library blew up");
    }
}

// --- State scaffolding ---

pub struct Harness {
    pub state: AppState,
    pub sessions: Arc<MockSessions>,
    pub shield: Arc<MockShield>,
    pub auth_backend: Arc<MockUpstream>,
    pub pages: Arc<MockUpstream>,
}

impl Harness {
    pub fn new(sessions: SessionBehaviour) -> Self {
        Self::with_shield(sessions, MockShield::returning(AbuseDecision::Allowed))
    }

    pub fn with_shield(sessions: SessionBehaviour, shield: MockShield) -> Self {
        let config = AppConfig {
            session_timeout: Duration::from_millis(100),
            ..AppConfig::default()
        };
        let sessions = Arc::new(MockSessions::new(sessions));
        let shield = Arc::new(shield);
        let auth_backend = Arc::new(MockUpstream::new("auth-service"));
        let pages = Arc::new(MockUpstream::new("page"));

        let state = AppState {
            classifier: Arc::new(RouteClassifier::new(config.public_routes.clone())),
            matcher: GateMatcher,
            sessions: sessions.clone(),
            shield: shield.clone(),
            header_stage: Arc::new(SecureHeaders::new(config.env, None)),
            auth_backend: auth_backend.clone(),
            pages: pages.clone(),
            config,
        };

        Self {
            state,
            sessions,
            shield,
            auth_backend,
            pages,
        }
    }

    pub fn with_header_stage(mut self, stage: Arc<dyn SecurityHeaderStage>) -> Self {
        self.state.header_stage = stage;
        self
    }

    pub fn with_auth_backend(mut self, backend: Arc<MockUpstream>) -> Self {
        self.state.auth_backend = backend.clone();
        self.auth_backend = backend;
        self
    }

    pub fn router(&self) -> Router {
        app_gate::create_router(self.state.clone())
    }
}

pub async fn send(router: Router, request: Request) -> Response {
    router.oneshot(request).await.unwrap()
}

pub fn get(uri: &str) -> Request {
    Request::builder()
        .uri(uri)
        .header("user-agent", "Mozilla/5.0 (X11; Linux x86_64)")
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &str) -> Request {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("user-agent", "Mozilla/5.0 (X11; Linux x86_64)")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
}

pub fn assert_redirect(response: &Response, target: &str) {
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(response), Some(target));
}
