use std::{env, time::Duration};

/// Public prefixes used when `PUBLIC_ROUTES` is not set. `/` only matches the root itself.
pub const DEFAULT_PUBLIC_ROUTES: &[&str] = &["/", "/auth", "/api/auth", "/legal"];

/// AppConfig
///
/// Holds the gateway's entire configuration state. Immutable once loaded and shared
/// through `AppState`, so every request sees the same allow-list, mode and upstreams.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime mode. Injected into the gate instead of being read per request.
    pub env: Env,
    // Socket address the HTTP server binds to.
    pub listen_addr: String,
    // Base URL of the auth service (session lookup and auth API handler).
    pub auth_service_url: String,
    // Base URL of the page renderer that receives requests the gate lets through.
    pub app_upstream_url: String,
    // Ordered allow-list of public path prefixes.
    pub public_routes: Vec<String>,
    // Upper bound for one session lookup. Exceeding it fails the request.
    pub session_timeout: Duration,
    // When set, sessions are verified locally from a signed token instead of
    // asking the auth service.
    pub session_jwt_secret: Option<String>,
    // Cookie carrying the session token for local verification.
    pub session_cookie: String,
    pub shield: ShieldConfig,
    // Overrides the default Content-Security-Policy emitted by the header stage.
    pub content_security_policy: Option<String>,
}

/// ShieldConfig
///
/// Abuse protection settings for the auth API. A remote URL selects the hosted
/// decision service; otherwise the in-process shield applies the same rules.
#[derive(Clone, Debug)]
pub struct ShieldConfig {
    pub remote_url: Option<String>,
    pub remote_key: Option<String>,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_key: None,
            rate_limit_max: 5,
            rate_limit_window: Duration::from_secs(5 * 60),
        }
    }
}

/// Env
///
/// Runtime context. `Production` switches logging to JSON, enables HSTS and makes
/// every upstream URL mandatory.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe, non-panicking configuration for test scaffolding.
    fn default() -> Self {
        Self {
            env: Env::Local,
            listen_addr: "127.0.0.1:3000".to_string(),
            auth_service_url: "http://localhost:3001".to_string(),
            app_upstream_url: "http://localhost:3002".to_string(),
            public_routes: DEFAULT_PUBLIC_ROUTES.iter().map(|r| r.to_string()).collect(),
            session_timeout: Duration::from_millis(5000),
            session_jwt_secret: None,
            session_cookie: "app.session_token".to_string(),
            shield: ShieldConfig::default(),
            content_security_policy: None,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables at startup.
    ///
    /// # Panics
    /// Panics when a setting required in `Production` is missing, or when a numeric
    /// setting cannot be parsed. The gateway must not start half-configured.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let mode = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };
        let defaults = Self::default();

        let (auth_service_url, app_upstream_url) = match mode {
            Env::Production => (
                env::var("AUTH_SERVICE_URL")
                    .expect("FATAL: AUTH_SERVICE_URL must be set in production."),
                env::var("APP_UPSTREAM_URL")
                    .expect("FATAL: APP_UPSTREAM_URL must be set in production."),
            ),
            Env::Local => (
                env::var("AUTH_SERVICE_URL").unwrap_or(defaults.auth_service_url),
                env::var("APP_UPSTREAM_URL").unwrap_or(defaults.app_upstream_url),
            ),
        };

        let public_routes = env::var("PUBLIC_ROUTES")
            .map(|raw| parse_route_list(&raw))
            .unwrap_or(defaults.public_routes);

        let remote_url = env::var("ABUSE_SHIELD_URL").ok();
        let remote_key = match (mode, &remote_url) {
            (Env::Production, Some(_)) => Some(
                env::var("ABUSE_SHIELD_KEY")
                    .expect("FATAL: ABUSE_SHIELD_KEY must be set when ABUSE_SHIELD_URL is."),
            ),
            _ => env::var("ABUSE_SHIELD_KEY").ok(),
        };

        let shield = ShieldConfig {
            remote_url,
            remote_key,
            rate_limit_max: parse_var("RATE_LIMIT_MAX").unwrap_or(defaults.shield.rate_limit_max),
            rate_limit_window: parse_var("RATE_LIMIT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shield.rate_limit_window),
        };

        Self {
            env: mode,
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            auth_service_url,
            app_upstream_url,
            public_routes,
            session_timeout: parse_var("SESSION_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.session_timeout),
            session_jwt_secret: env::var("SESSION_JWT_SECRET").ok(),
            session_cookie: env::var("SESSION_COOKIE").unwrap_or(defaults.session_cookie),
            shield,
            content_security_policy: env::var("CONTENT_SECURITY_POLICY").ok(),
        }
    }
}

/// Splits a comma-separated prefix list, dropping blanks.
pub fn parse_route_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|route| !route.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().map(|raw| {
        raw.trim()
            .parse()
            .unwrap_or_else(|_| panic!("FATAL: {key} must be a number, got {raw:?}"))
    })
}
