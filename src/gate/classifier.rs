/// Path of the onboarding route. Its nested step pages share the class.
pub const ONBOARDING_PATH: &str = "/onboard";

/// RouteClass
///
/// Classification of a request path. Recomputed on every request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Onboarding,
    Protected,
}

/// RouteClassifier
///
/// Maps a request path to exactly one [`RouteClass`]. The allow-list is ordered and
/// matched by prefix, except for the entry `/`, which only matches the root itself.
/// The onboarding route is checked first because its public-ness depends on the
/// session, not on the path.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    public_prefixes: Vec<String>,
}

impl RouteClassifier {
    pub fn new<I, S>(public_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            public_prefixes: public_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn public_prefixes(&self) -> &[String] {
        &self.public_prefixes
    }

    /// Query strings and fragments are ignored: `/dashboard?from=email` classifies
    /// exactly like `/dashboard`.
    pub fn classify(&self, path: &str) -> RouteClass {
        let path = strip_query(path);

        if is_onboarding(path) {
            return RouteClass::Onboarding;
        }

        if self.is_public(path) {
            return RouteClass::Public;
        }

        RouteClass::Protected
    }

    fn is_public(&self, path: &str) -> bool {
        self.public_prefixes.iter().any(|prefix| {
            if prefix == "/" {
                path == "/"
            } else {
                path.starts_with(prefix.as_str())
            }
        })
    }
}

fn is_onboarding(path: &str) -> bool {
    match path.strip_prefix(ONBOARDING_PATH) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Drops everything from the first `?` or `#`.
pub fn strip_query(path: &str) -> &str {
    match path.find(['?', '#']) {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Framework-internal path prefixes that never reach the gate.
const INTERNAL_PREFIXES: &[&str] = &["/_next"];

/// Prefixes that are always gated, even when they look like static files.
const ALWAYS_GATED_PREFIXES: &[&str] = &["/api", "/trpc"];

const STATIC_EXTENSIONS: &[&str] = &[
    "html", "htm", "css", "js", "jpg", "jpeg", "webp", "png", "gif", "svg", "ttf", "woff",
    "woff2", "ico", "csv", "doc", "docx", "xls", "xlsx", "zip", "webmanifest",
];

/// GateMatcher
///
/// Companion to the classifier: decides whether a path is evaluated by the gate at
/// all. Static assets and framework internals bypass it entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateMatcher;

impl GateMatcher {
    pub fn is_gated(&self, path: &str) -> bool {
        let path = strip_query(path);

        if ALWAYS_GATED_PREFIXES
            .iter()
            .any(|prefix| has_segment_prefix(path, prefix))
        {
            return true;
        }

        if INTERNAL_PREFIXES
            .iter()
            .any(|prefix| has_segment_prefix(path, prefix))
        {
            return false;
        }

        !is_static_asset(path)
    }
}

fn has_segment_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn is_static_asset(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            STATIC_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}
