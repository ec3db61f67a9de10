//! Session manager: the application's single entry point to the session core.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::bootstrap::{BootstrapOutcome, SessionBootstrapper, UserIdentity};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::fetcher::AuthenticatedFetcher;
use crate::navigator::SharedNavigator;
use crate::redirect::RedirectPolicy;
use crate::refresh::RefreshCoordinator;
use crate::roles;
use crate::state::{SessionSnapshot, SessionState};
use crate::transport::{ApiRequest, ApiResponse, SharedTransport};

/// Owns the session state and every component that touches it.
///
/// Construct one per process. Cheap to clone; clones share everything.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use portal_auth::{ApiRequest, ReqwestTransport, SessionConfig, SessionManager};
/// # use portal_auth::Navigator;
/// # #[derive(Debug)]
/// # struct Browser;
/// # impl Navigator for Browser {
/// #     fn navigate(&self, _url: &str) {}
/// #     fn current_path(&self) -> String { "/".into() }
/// # }
///
/// # async fn example() -> portal_auth::Result<()> {
/// let config = SessionConfig::new("https://portal.example.edu/api")?;
/// let transport = Arc::new(ReqwestTransport::new(&config)?);
/// let session = SessionManager::new(config, transport, Arc::new(Browser));
///
/// session.check_auth().await;
/// if session.is_authenticated() {
///     let tickets = session.fetch_with_auth(ApiRequest::get("/api/tickets")).await?;
///     println!("{}", tickets.text());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

#[derive(Debug)]
struct ManagerInner {
    config: SessionConfig,
    transport: SharedTransport,
    state: Arc<SessionState>,
    redirect: RedirectPolicy,
    refresher: RefreshCoordinator,
    fetcher: AuthenticatedFetcher,
    bootstrapper: SessionBootstrapper,
}

impl SessionManager {
    /// Wire up the session core.
    pub fn new(config: SessionConfig, transport: SharedTransport, navigator: SharedNavigator) -> Self {
        let endpoints = config.endpoints.clone();
        let state = Arc::new(SessionState::new());
        let redirect = RedirectPolicy::new(
            navigator,
            endpoints.login_page.clone(),
            endpoints.exempt_routes(),
        );
        let refresher = RefreshCoordinator::new(
            Arc::clone(&transport),
            endpoints.clone(),
            Arc::clone(&state),
            redirect.clone(),
        );
        let fetcher = AuthenticatedFetcher::new(
            Arc::clone(&transport),
            config.base_url.clone(),
            endpoints.clone(),
            Arc::clone(&state),
            refresher.clone(),
        )
        .with_stale_after(config.stale_after);
        let bootstrapper = SessionBootstrapper::new(
            Arc::clone(&transport),
            endpoints,
            Arc::clone(&state),
            refresher.clone(),
            redirect.clone(),
            config.bootstrap_timeout,
        );

        Self {
            inner: Arc::new(ManagerInner {
                config,
                transport,
                state,
                redirect,
                refresher,
                fetcher,
                bootstrapper,
            }),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────

    /// Current session snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.snapshot()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.is_loading()
    }

    /// Roles of the signed-in user, sorted. Empty when not authenticated.
    pub fn user_roles(&self) -> Vec<String> {
        self.inner.state.snapshot().user_roles()
    }

    /// Last unrecoverable failure.
    pub fn error(&self) -> Option<String> {
        self.inner.state.snapshot().error
    }

    /// The signed-in user, if the role lookup succeeded.
    pub fn identity(&self) -> Option<UserIdentity> {
        if !self.is_authenticated() {
            return None;
        }
        self.inner.bootstrapper.identity()
    }

    /// Whether the current roles include a privileged one.
    pub fn has_admin_role(&self) -> bool {
        let current = self.inner.state.snapshot().roles;
        roles::has_admin_role(&current, &self.inner.config.admin_roles)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Actions
    // ─────────────────────────────────────────────────────────────────────

    /// Run the one-time bootstrap.
    pub async fn check_auth(&self) -> BootstrapOutcome {
        self.inner.bootstrapper.check_auth().await
    }

    /// Send an API call with session recovery.
    pub async fn fetch_with_auth(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.inner.fetcher.fetch_with_auth(request).await
    }

    /// Refresh the session now. Joins a refresh already in flight.
    pub async fn refresh(&self) -> bool {
        self.inner.refresher.refresh().await
    }

    /// Navigate to the OAuth authorization entry point.
    pub fn login(&self) -> Result<()> {
        let url = self.inner.config.login_url()?;
        info!(url = %url, "Starting login");
        self.inner.redirect.navigate(url.as_str());
        Ok(())
    }

    /// End the session locally and on the server, then go to the login page.
    ///
    /// Local state is cleared before the server is told, so nothing that
    /// resolves afterwards can resurrect the session. A failed server call is
    /// logged and otherwise ignored.
    pub async fn logout(&self) {
        let inner = &self.inner;
        inner.state.reset();
        inner.bootstrapper.clear_identity();

        let request = ApiRequest::post(inner.config.endpoints.logout.clone());
        match inner.transport.send(request).await {
            Ok(response) if response.is_success() => info!("Server session ended"),
            Ok(response) => warn!(status = %response.status, "Server logout refused"),
            Err(e) => warn!(error = %e, "Server logout failed"),
        }

        inner.redirect.force_redirect();
    }
}
