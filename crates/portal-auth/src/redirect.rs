//! Redirect policy for terminal auth failures and logout.

use tracing::{debug, info};

use crate::config::request_path;
use crate::navigator::SharedNavigator;

/// Decides whether and where to navigate when the session is lost.
///
/// Automatic redirects are suppressed on the login page and the OAuth
/// callback route, which see transient unauthenticated states during the
/// handshake and would otherwise loop.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    navigator: SharedNavigator,
    login_page: String,
    exempt_routes: Vec<String>,
}

impl RedirectPolicy {
    /// Create a policy that sends users to `login_page`, never redirecting
    /// away from any of `exempt_routes`.
    pub fn new(
        navigator: SharedNavigator,
        login_page: impl Into<String>,
        exempt_routes: Vec<String>,
    ) -> Self {
        Self {
            navigator,
            login_page: login_page.into(),
            exempt_routes: exempt_routes.iter().map(|r| request_path(r)).collect(),
        }
    }

    /// Whether `path` is, or sits below, an exempt route.
    pub fn is_exempt(&self, path: &str) -> bool {
        let path = request_path(path);
        self.exempt_routes.iter().any(|route| {
            path == *route
                || path
                    .strip_prefix(route.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Whether the route currently displayed is exempt.
    pub fn current_route_exempt(&self) -> bool {
        self.is_exempt(&self.navigator.current_path())
    }

    /// Navigate to the login page unless the current route is exempt.
    ///
    /// Returns true if a navigation happened.
    pub fn redirect_to_login(&self) -> bool {
        let current = self.navigator.current_path();
        if self.is_exempt(&current) {
            debug!(route = %current, "Redirect suppressed on exempt route");
            return false;
        }
        info!(from = %current, to = %self.login_page, "Redirecting to login");
        self.navigator.navigate(&self.login_page);
        true
    }

    /// Navigate to the login page unconditionally. Used by logout.
    pub fn force_redirect(&self) {
        info!(to = %self.login_page, "Redirecting to login after logout");
        self.navigator.navigate(&self.login_page);
    }

    /// Navigate to an arbitrary URL (the OAuth entry point).
    pub fn navigate(&self, url: &str) {
        self.navigator.navigate(url);
    }
}
