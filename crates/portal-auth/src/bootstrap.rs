//! Initial session check on application load.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AuthEndpoints;
use crate::error::{AuthError, Result};
use crate::redirect::RedirectPolicy;
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::state::SessionState;
use crate::transport::{ApiRequest, SharedTransport};

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    authenticated: bool,
}

/// User identifier as sent by the server, numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{}", n),
            UserId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// The signed-in user, from `whoAmI`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub user_roles: Vec<String>,
}

/// Interpreted answer of the verify endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    /// `200 {authenticated: true}`
    Authenticated,
    /// `200 {authenticated: false}`
    Unauthenticated,
    /// `401`; a refresh may recover the session.
    Expired,
}

/// How the bootstrap ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The current route is exempt; nothing was sent.
    Skipped,
    /// Bootstrap had already run for this application load.
    AlreadyRan,
    /// The session is authenticated.
    Authenticated,
    /// The server reports no usable session.
    Unauthenticated,
    /// The bootstrap did not finish in time and failed closed.
    TimedOut,
    /// Verify failed with an error and the bootstrap failed closed.
    Failed(String),
}

impl BootstrapOutcome {
    /// Whether the session ended up authenticated.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, BootstrapOutcome::Authenticated)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionBootstrapper
// ─────────────────────────────────────────────────────────────────────────────

/// Ends the loading phase however the bootstrap exits.
struct LoadingGuard(Arc<SessionState>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.finish_loading();
    }
}

/// Establishes the session once per application load.
#[derive(Debug)]
pub struct SessionBootstrapper {
    transport: SharedTransport,
    endpoints: AuthEndpoints,
    state: Arc<SessionState>,
    refresher: RefreshCoordinator,
    redirect: RedirectPolicy,
    timeout: Duration,
    started: AtomicBool,
    identity: Mutex<Option<UserIdentity>>,
}

impl SessionBootstrapper {
    /// Create a bootstrapper bounded by `timeout`.
    pub fn new(
        transport: SharedTransport,
        endpoints: AuthEndpoints,
        state: Arc<SessionState>,
        refresher: RefreshCoordinator,
        redirect: RedirectPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            endpoints,
            state,
            refresher,
            redirect,
            timeout,
            started: AtomicBool::new(false),
            identity: Mutex::new(None),
        }
    }

    /// Verify the session, refreshing if it expired, and load roles.
    ///
    /// Runs once; later calls return [`BootstrapOutcome::AlreadyRan`].
    /// `loading` is false when this returns or is dropped.
    pub async fn check_auth(&self) -> BootstrapOutcome {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Bootstrap already ran");
            return BootstrapOutcome::AlreadyRan;
        }
        let _loading = LoadingGuard(Arc::clone(&self.state));

        if self.redirect.current_route_exempt() {
            debug!("Bootstrap skipped on exempt route");
            return BootstrapOutcome::Skipped;
        }

        let generation = self.state.generation();
        match tokio::time::timeout(self.timeout, self.run(generation)).await {
            Ok(outcome) => {
                info!(outcome = ?outcome, "Bootstrap finished");
                outcome
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Bootstrap timed out");
                // A refresh started by the abandoned run keeps going on its
                // own task; moving the generation on discards its result.
                let message = format!("Session check timed out after {:?}", self.timeout);
                if self.state.invalidate(generation, Some(message)) {
                    self.redirect.redirect_to_login();
                }
                BootstrapOutcome::TimedOut
            }
        }
    }

    /// Identity loaded by the last successful role lookup.
    pub fn identity(&self) -> Option<UserIdentity> {
        self.identity.lock().clone()
    }

    /// Forget the loaded identity.
    pub fn clear_identity(&self) {
        *self.identity.lock() = None;
    }

    /// Call the verify endpoint and interpret its answer.
    pub async fn verify(&self) -> Result<VerifyStatus> {
        let request = ApiRequest::get(self.endpoints.verify.clone());
        let response = self.transport.send(request).await?;

        if response.is_unauthorized() {
            return Ok(VerifyStatus::Expired);
        }
        if !response.is_success() {
            return Err(AuthError::UnexpectedStatus {
                endpoint: self.endpoints.verify.clone(),
                status: response.status.as_u16(),
            });
        }

        let body: VerifyResponse = response.json()?;
        Ok(if body.authenticated {
            VerifyStatus::Authenticated
        } else {
            VerifyStatus::Unauthenticated
        })
    }

    /// Fetch the signed-in user.
    pub async fn who_am_i(&self) -> Result<UserIdentity> {
        let request = ApiRequest::get(self.endpoints.who_am_i.clone());
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| AuthError::RoleLookup(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::RoleLookup(format!(
                "{} answered {}",
                self.endpoints.who_am_i, response.status
            )));
        }
        response
            .json()
            .map_err(|e| AuthError::RoleLookup(e.to_string()))
    }

    async fn run(&self, generation: u64) -> BootstrapOutcome {
        match self.verify().await {
            Ok(VerifyStatus::Authenticated) => self.establish(generation).await,
            Ok(VerifyStatus::Unauthenticated) => {
                debug!("Server reports no session");
                self.fail_closed(generation, None);
                BootstrapOutcome::Unauthenticated
            }
            Ok(VerifyStatus::Expired) => self.recover(generation).await,
            Err(e) => self.fail_with(generation, e),
        }
    }

    async fn recover(&self, generation: u64) -> BootstrapOutcome {
        debug!("Session expired, attempting refresh");
        match self.refresher.refresh_outcome().await {
            RefreshOutcome::Refreshed => {}
            // Rejected already cleared the session and redirected
            RefreshOutcome::Rejected | RefreshOutcome::Superseded => {
                return BootstrapOutcome::Unauthenticated;
            }
        }

        // No second refresh if the renewed session is still refused
        match self.verify().await {
            Ok(VerifyStatus::Authenticated) => self.establish(generation).await,
            Ok(status) => {
                warn!(status = ?status, "Session refused after refresh");
                self.fail_closed(generation, Some("Session refused after refresh".to_string()));
                BootstrapOutcome::Unauthenticated
            }
            Err(e) => self.fail_with(generation, e),
        }
    }

    async fn establish(&self, generation: u64) -> BootstrapOutcome {
        if !self.state.mark_authenticated(generation, Utc::now()) {
            return BootstrapOutcome::Unauthenticated;
        }

        match self.who_am_i().await {
            Ok(identity) => {
                let roles: BTreeSet<String> = identity.user_roles.iter().cloned().collect();
                if self.state.set_roles(generation, roles) {
                    debug!(user = %identity.username, "Loaded user roles");
                    *self.identity.lock() = Some(identity);
                }
            }
            Err(e) => {
                warn!(error = %e, "Continuing without roles");
                self.state.set_roles(generation, BTreeSet::new());
            }
        }
        BootstrapOutcome::Authenticated
    }

    fn fail_with(&self, generation: u64, error: AuthError) -> BootstrapOutcome {
        warn!(error = %error, "Session check failed");
        let message = error.to_string();
        self.fail_closed(generation, Some(message.clone()));
        BootstrapOutcome::Failed(message)
    }

    fn fail_closed(&self, generation: u64, error: Option<String>) {
        if self.state.generation() != generation {
            return;
        }
        self.state.clear(error);
        self.redirect.redirect_to_login();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockReply, MockTransport, RecordingNavigator};
    use reqwest::{Method, StatusCode};
    use serde_json::json;

    struct Fixture {
        transport: Arc<MockTransport>,
        navigator: Arc<RecordingNavigator>,
        state: Arc<SessionState>,
        bootstrapper: SessionBootstrapper,
    }

    fn fixture(at: &str) -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let navigator = Arc::new(RecordingNavigator::at(at));
        let state = Arc::new(SessionState::new());
        let endpoints = AuthEndpoints::default();
        let redirect =
            RedirectPolicy::new(navigator.clone(), "/login", endpoints.exempt_routes());
        let refresher = RefreshCoordinator::new(
            transport.clone(),
            endpoints.clone(),
            state.clone(),
            redirect.clone(),
        );
        let bootstrapper = SessionBootstrapper::new(
            transport.clone(),
            endpoints,
            state.clone(),
            refresher,
            redirect,
            Duration::from_secs(30),
        );
        Fixture {
            transport,
            navigator,
            state,
            bootstrapper,
        }
    }

    fn who_am_i(roles: &[&str]) -> MockReply {
        MockReply::json(json!({"id": 42, "username": "asha", "userRoles": roles}))
    }

    #[test]
    fn test_identity_deserializes_either_id_form() {
        let numeric: UserIdentity =
            serde_json::from_value(json!({"id": 7, "username": "a", "userRoles": ["X"]})).unwrap();
        assert_eq!(numeric.id, UserId::Number(7));
        assert_eq!(numeric.user_roles, vec!["X".to_string()]);

        let textual: UserIdentity =
            serde_json::from_value(json!({"id": "u-7", "username": "a"})).unwrap();
        assert_eq!(textual.id.to_string(), "u-7");
        assert!(textual.user_roles.is_empty());
    }

    #[tokio::test]
    async fn test_authenticated_loads_roles() {
        let f = fixture("/dashboard");
        f.transport.on(
            Method::GET,
            "/auth/verify",
            MockReply::json(json!({"authenticated": true})),
        );
        f.transport
            .on(Method::GET, "/user/whoAmI", who_am_i(&["STUDENT"]));

        assert_eq!(f.bootstrapper.check_auth().await, BootstrapOutcome::Authenticated);

        let snap = f.state.snapshot();
        assert!(snap.authenticated);
        assert!(!snap.loading);
        assert_eq!(snap.user_roles(), vec!["STUDENT".to_string()]);
        assert_eq!(f.bootstrapper.identity().unwrap().username, "asha");
    }

    #[tokio::test]
    async fn test_unauthenticated_redirects() {
        let f = fixture("/dashboard");
        f.transport.on(
            Method::GET,
            "/auth/verify",
            MockReply::json(json!({"authenticated": false})),
        );

        assert_eq!(
            f.bootstrapper.check_auth().await,
            BootstrapOutcome::Unauthenticated
        );
        assert!(!f.state.is_loading());
        assert_eq!(f.navigator.visits(), vec!["/login".to_string()]);
        assert_eq!(f.transport.calls(Method::GET, "/user/whoAmI"), 0);
    }

    #[tokio::test]
    async fn test_server_error_fails_closed() {
        let f = fixture("/dashboard");
        f.transport.on(
            Method::GET,
            "/auth/verify",
            MockReply::Status(StatusCode::INTERNAL_SERVER_ERROR),
        );

        let outcome = f.bootstrapper.check_auth().await;

        assert!(matches!(outcome, BootstrapOutcome::Failed(_)));
        let snap = f.state.snapshot();
        assert!(!snap.authenticated);
        assert!(!snap.loading);
        assert!(snap.error.unwrap().contains("500"));
        assert_eq!(f.navigator.visit_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_verify_body_fails_closed() {
        let f = fixture("/dashboard");
        f.transport.on(
            Method::GET,
            "/auth/verify",
            MockReply::json(json!({"status": "ok"})),
        );

        assert!(matches!(
            f.bootstrapper.check_auth().await,
            BootstrapOutcome::Failed(_)
        ));
        assert!(!f.state.is_authenticated());
    }

    #[tokio::test]
    async fn test_second_call_is_noop() {
        let f = fixture("/dashboard");
        f.transport.on(
            Method::GET,
            "/auth/verify",
            MockReply::json(json!({"authenticated": true})),
        );
        f.transport.on(Method::GET, "/user/whoAmI", who_am_i(&[]));

        f.bootstrapper.check_auth().await;
        assert_eq!(f.bootstrapper.check_auth().await, BootstrapOutcome::AlreadyRan);
        assert_eq!(f.transport.calls(Method::GET, "/auth/verify"), 1);
    }

    #[tokio::test]
    async fn test_refresh_then_reverify_still_401_fails_closed() {
        let f = fixture("/dashboard");
        f.transport
            .on(Method::GET, "/auth/verify", MockReply::unauthorized());
        f.transport.on(Method::POST, "/auth/refresh", MockReply::ok());

        assert_eq!(
            f.bootstrapper.check_auth().await,
            BootstrapOutcome::Unauthenticated
        );
        assert_eq!(f.transport.calls(Method::GET, "/auth/verify"), 2);
        assert_eq!(f.transport.calls(Method::POST, "/auth/refresh"), 1);
        assert!(!f.state.is_authenticated());
        assert_eq!(f.navigator.visit_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_rejected_during_bootstrap() {
        let f = fixture("/dashboard");
        f.transport
            .on(Method::GET, "/auth/verify", MockReply::unauthorized());
        f.transport
            .on(Method::POST, "/auth/refresh", MockReply::unauthorized());

        assert_eq!(
            f.bootstrapper.check_auth().await,
            BootstrapOutcome::Unauthenticated
        );
        assert!(!f.state.is_loading());
        assert_eq!(f.navigator.visits(), vec!["/login".to_string()]);
        assert_eq!(f.transport.calls(Method::GET, "/auth/verify"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_closed() {
        let f = fixture("/dashboard");
        f.transport.on(
            Method::GET,
            "/auth/verify",
            MockReply::json(json!({"authenticated": true})),
        );
        let _gate = f.transport.gate(Method::GET, "/auth/verify");

        assert_eq!(f.bootstrapper.check_auth().await, BootstrapOutcome::TimedOut);

        let snap = f.state.snapshot();
        assert!(!snap.authenticated);
        assert!(!snap.loading);
        assert!(snap.error.unwrap().contains("timed out"));
        assert_eq!(f.navigator.visit_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_bootstrap_still_finishes_loading() {
        let f = fixture("/dashboard");
        f.transport.on(
            Method::GET,
            "/auth/verify",
            MockReply::json(json!({"authenticated": true})),
        );
        let _gate = f.transport.gate(Method::GET, "/auth/verify");

        {
            let check = f.bootstrapper.check_auth();
            tokio::pin!(check);
            assert!(futures::poll!(check.as_mut()).is_pending());
            assert!(f.state.is_loading());
        }

        assert!(!f.state.is_loading());
    }
}
