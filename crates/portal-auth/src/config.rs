//! Runtime configuration for the session core.

use std::collections::BTreeSet;
use std::time::Duration;

use url::Url;

use crate::error::{AuthError, Result};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on the whole bootstrap procedure.
pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default age after which a verified session is refreshed before use.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(55 * 60);

/// Roles that pass the admin gate unless configured otherwise.
pub const DEFAULT_ADMIN_ROLES: [&str; 3] = ["ADMIN", "SUPER_ADMIN", "STUDENT_ADMIN"];

// ─────────────────────────────────────────────────────────────────────────────
// Endpoints
// ─────────────────────────────────────────────────────────────────────────────

/// Server endpoints and client routes the session core talks about.
///
/// Endpoint values are paths relative to the API base URL. Route values are
/// paths in the application itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    /// `GET`, answers `{authenticated: bool}` or 401.
    pub verify: String,
    /// `POST`, rotates the session cookie or answers 401.
    pub refresh: String,
    /// `GET`, answers `{id, username, userRoles}`.
    pub who_am_i: String,
    /// `POST`, invalidates the server session.
    pub logout: String,
    /// OAuth authorization entry point, reached by navigation.
    pub login: String,
    /// Application route of the login page.
    pub login_page: String,
    /// Application route the OAuth provider redirects back to.
    pub oauth_callback: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            verify: "/auth/verify".to_string(),
            refresh: "/auth/refresh".to_string(),
            who_am_i: "/user/whoAmI".to_string(),
            logout: "/auth/logout".to_string(),
            login: "/auth/login".to_string(),
            login_page: "/login".to_string(),
            oauth_callback: "/oauth/callback".to_string(),
        }
    }
}

impl AuthEndpoints {
    /// Whether a request target must bypass 401 handling.
    ///
    /// The verify, refresh and login endpoints are called by the pipeline
    /// itself; wrapping them would recurse. Absolute targets are matched
    /// relative to `base_url`, so `https://host/api/auth/verify` is the verify
    /// endpoint when the API lives under `/api`.
    pub fn is_auth_exempt(&self, base_url: &Url, target: &str) -> bool {
        let Some(path) = endpoint_path(base_url, target) else {
            return false;
        };
        [&self.verify, &self.refresh, &self.login]
            .iter()
            .any(|endpoint| path == normalize(endpoint))
    }

    /// Application routes on which no auth redirect may fire.
    pub fn exempt_routes(&self) -> Vec<String> {
        vec![self.login_page.clone(), self.oauth_callback.clone()]
    }
}

/// Extract the path of a request target, which may be a bare path or an
/// absolute URL. Query and fragment are dropped.
pub(crate) fn request_path(target: &str) -> String {
    let path = match Url::parse(target) {
        Ok(url) => url.path().to_string(),
        Err(_) => target
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    normalize(&path)
}

/// Path of `target` below `base_url`. Bare paths are already relative to the
/// base; absolute URLs outside it have no endpoint path.
fn endpoint_path(base_url: &Url, target: &str) -> Option<String> {
    let Ok(url) = Url::parse(target) else {
        return Some(request_path(target));
    };
    if url.origin() != base_url.origin() {
        return None;
    }
    let base = base_url.path().trim_end_matches('/');
    let rest = url.path().strip_prefix(base)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    Some(normalize(rest))
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// API base URL all endpoint paths are resolved against.
    pub base_url: Url,

    /// Endpoint and route layout.
    pub endpoints: AuthEndpoints,

    /// Timeout applied to every transport request.
    pub request_timeout: Duration,

    /// Bound on the whole bootstrap procedure.
    pub bootstrap_timeout: Duration,

    /// Refresh proactively when the last verification is older than this.
    /// `None` disables proactive refresh.
    pub stale_after: Option<Duration>,

    /// Roles that pass [`has_admin_role`](crate::roles::has_admin_role).
    pub admin_roles: BTreeSet<String>,
}

impl SessionConfig {
    /// Create a configuration for the given API base URL with defaults.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AuthError::Config(format!(
                "base_url '{}' cannot be used as a base",
                base_url
            )));
        }
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        Ok(Self {
            base_url,
            endpoints: AuthEndpoints::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            bootstrap_timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
            stale_after: Some(DEFAULT_STALE_AFTER),
            admin_roles: DEFAULT_ADMIN_ROLES.iter().map(|r| r.to_string()).collect(),
        })
    }

    /// Replace the endpoint layout.
    pub fn with_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the bootstrap timeout.
    pub fn with_bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.bootstrap_timeout = timeout;
        self
    }

    /// Set the staleness threshold for proactive refresh.
    pub fn with_stale_after(mut self, threshold: Duration) -> Self {
        self.stale_after = Some(threshold);
        self
    }

    /// Disable proactive refresh.
    pub fn without_stale_after(mut self) -> Self {
        self.stale_after = None;
        self
    }

    /// Replace the privileged role set.
    pub fn with_admin_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admin_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve an endpoint path or absolute URL against the base URL.
    pub fn resolve(&self, target: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(target) {
            return Ok(url);
        }
        let path = target.trim_start_matches('/');
        self.base_url.join(path).map_err(AuthError::from)
    }

    /// Absolute URL of the OAuth authorization entry point.
    pub fn login_url(&self) -> Result<Url> {
        self.resolve(&self.endpoints.login)
    }
}
