//! Authenticated API calls with refresh-and-retry-once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;
use url::Url;

use crate::config::AuthEndpoints;
use crate::error::{AuthError, Result};
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::state::SessionState;
use crate::transport::{ApiRequest, ApiResponse, SharedTransport};

/// Sends domain API calls, recovering from one session expiry per call.
#[derive(Debug, Clone)]
pub struct AuthenticatedFetcher {
    transport: SharedTransport,
    base_url: Url,
    endpoints: AuthEndpoints,
    state: Arc<SessionState>,
    refresher: RefreshCoordinator,
    stale_after: Option<Duration>,
}

impl AuthenticatedFetcher {
    /// Create a fetcher for the API under `base_url`.
    pub fn new(
        transport: SharedTransport,
        base_url: Url,
        endpoints: AuthEndpoints,
        state: Arc<SessionState>,
        refresher: RefreshCoordinator,
    ) -> Self {
        Self {
            transport,
            base_url,
            endpoints,
            state,
            refresher,
            stale_after: None,
        }
    }

    /// Refresh before sending when the last verification is older than
    /// `threshold`.
    pub fn with_stale_after(mut self, threshold: Option<Duration>) -> Self {
        self.stale_after = threshold;
        self
    }

    /// Send `request` with credentials.
    ///
    /// A 401 triggers the shared refresh. If that succeeds, the original
    /// request is sent once more and its response returned as-is, even if it
    /// is another 401. If the refresh fails, the call fails with
    /// [`AuthError::Authentication`]; the refresh itself has already cleared
    /// the session and redirected.
    ///
    /// Responses other than 401 are returned unmodified; transport errors
    /// propagate unmodified.
    pub async fn fetch_with_auth(&self, request: ApiRequest) -> Result<ApiResponse> {
        if self.endpoints.is_auth_exempt(&self.base_url, &request.target) {
            debug!(path = %request.path(), "Auth-exempt request, sending directly");
            return self.transport.send(request).await;
        }

        if self.is_stale() {
            debug!(path = %request.path(), "Session stale, refreshing before request");
            match self.refresher.refresh_outcome().await {
                RefreshOutcome::Refreshed => {}
                outcome => return Err(self.unrecoverable(outcome)),
            }
        }

        // Kept for the replay; the first send consumes its own copy
        let retry = request.clone();
        let response = self.transport.send(request).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        debug!(path = %retry.path(), "Request unauthorized, refreshing session");
        match self.refresher.refresh_outcome().await {
            RefreshOutcome::Refreshed => {
                debug!(path = %retry.path(), "Retrying request after refresh");
                self.transport.send(retry).await
            }
            outcome => Err(self.unrecoverable(outcome)),
        }
    }

    fn is_stale(&self) -> bool {
        let Some(threshold) = self.stale_after else {
            return false;
        };
        let snapshot = self.state.snapshot();
        if !snapshot.authenticated {
            return false;
        }
        let Some(verified_at) = snapshot.last_verified_at else {
            return false;
        };
        let age = Utc::now().signed_duration_since(verified_at);
        age.to_std().is_ok_and(|age| age > threshold)
    }

    /// Error for a refresh that did not succeed. State and navigation were
    /// settled by whoever ended the session.
    fn unrecoverable(&self, outcome: RefreshOutcome) -> AuthError {
        match outcome {
            RefreshOutcome::Superseded => {
                debug!("Session closed while request was pending");
                AuthError::Authentication("Session closed".to_string())
            }
            _ => AuthError::Authentication(
                self.state
                    .snapshot()
                    .error
                    .unwrap_or_else(|| "Session expired and could not be refreshed".to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redirect::RedirectPolicy;
    use crate::testing::{MockReply, MockTransport, RecordingNavigator};
    use reqwest::{Method, StatusCode};

    struct Fixture {
        transport: Arc<MockTransport>,
        navigator: Arc<RecordingNavigator>,
        state: Arc<SessionState>,
        fetcher: AuthenticatedFetcher,
    }

    fn fixture(stale_after: Option<Duration>) -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let navigator = Arc::new(RecordingNavigator::at("/events"));
        let state = Arc::new(SessionState::new());
        let endpoints = AuthEndpoints::default();
        let redirect =
            RedirectPolicy::new(navigator.clone(), "/login", endpoints.exempt_routes());
        let refresher =
            RefreshCoordinator::new(transport.clone(), endpoints.clone(), state.clone(), redirect);
        let base_url = Url::parse("https://portal.example.edu/api/").unwrap();
        let fetcher =
            AuthenticatedFetcher::new(transport.clone(), base_url, endpoints, state.clone(), refresher)
                .with_stale_after(stale_after);
        Fixture {
            transport,
            navigator,
            state,
            fetcher,
        }
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let f = fixture(None);
        f.transport.on(
            Method::GET,
            "/api/events",
            MockReply::json(serde_json::json!([{"id": 1}])),
        );

        let response = f.fetcher.fetch_with_auth(ApiRequest::get("/api/events")).await.unwrap();

        assert!(response.is_success());
        assert_eq!(f.transport.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_non_401_error_status_returned_unmodified() {
        let f = fixture(None);
        f.transport.on(
            Method::GET,
            "/api/events",
            MockReply::Status(StatusCode::FORBIDDEN),
        );

        let response = f.fetcher.fetch_with_auth(ApiRequest::get("/api/events")).await.unwrap();

        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(f.transport.calls(Method::POST, "/auth/refresh"), 0);
    }

    #[tokio::test]
    async fn test_network_error_propagates() {
        let f = fixture(None);
        f.transport.on(
            Method::GET,
            "/api/events",
            MockReply::NetworkError("offline".into()),
        );

        let err = f
            .fetcher
            .fetch_with_auth(ApiRequest::get("/api/events"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Network(_)));
        assert_eq!(f.transport.calls(Method::POST, "/auth/refresh"), 0);
    }

    #[tokio::test]
    async fn test_401_refresh_then_retry() {
        let f = fixture(None);
        f.transport
            .on(Method::GET, "/api/events", MockReply::unauthorized())
            .on(Method::GET, "/api/events", MockReply::ok());
        f.transport.on(Method::POST, "/auth/refresh", MockReply::ok());

        let response = f.fetcher.fetch_with_auth(ApiRequest::get("/api/events")).await.unwrap();

        assert!(response.is_success());
        assert_eq!(f.transport.calls(Method::GET, "/api/events"), 2);
        assert_eq!(f.transport.calls(Method::POST, "/auth/refresh"), 1);
        assert!(f.state.is_authenticated());
    }

    #[tokio::test]
    async fn test_exempt_endpoint_skips_refresh() {
        let f = fixture(None);
        f.transport
            .on(Method::GET, "/auth/verify", MockReply::unauthorized());

        let response = f.fetcher.fetch_with_auth(ApiRequest::get("/auth/verify")).await.unwrap();

        assert!(response.is_unauthorized());
        assert_eq!(f.transport.total_calls(), 1);
        assert_eq!(f.navigator.visit_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_and_redirects() {
        let f = fixture(None);
        f.state.mark_authenticated(f.state.generation(), Utc::now());
        f.transport
            .on(Method::GET, "/api/events", MockReply::unauthorized());
        f.transport
            .on(Method::POST, "/auth/refresh", MockReply::unauthorized());

        let err = f
            .fetcher
            .fetch_with_auth(ApiRequest::get("/api/events"))
            .await
            .unwrap_err();

        assert!(err.is_auth_error());
        assert!(!f.state.is_authenticated());
        assert!(f.state.snapshot().error.is_some());
        assert_eq!(f.navigator.visits(), vec!["/login".to_string()]);
        assert_eq!(f.transport.calls(Method::GET, "/api/events"), 1);
    }

    #[tokio::test]
    async fn test_rejected_refresh_keeps_its_error() {
        let f = fixture(None);
        f.state.mark_authenticated(f.state.generation(), Utc::now());
        let generation = f.state.generation();
        f.transport
            .on(Method::GET, "/api/events", MockReply::unauthorized());
        f.transport
            .on(Method::POST, "/auth/refresh", MockReply::unauthorized());

        let err = f
            .fetcher
            .fetch_with_auth(ApiRequest::get("/api/events"))
            .await
            .unwrap_err();

        let expected = "Session refresh rejected (401 Unauthorized)";
        assert!(matches!(err, AuthError::Authentication(ref m) if m == expected));
        assert_eq!(f.state.snapshot().error.as_deref(), Some(expected));
        assert_eq!(f.state.generation(), generation);
        assert_eq!(f.navigator.visit_count(), 1);
    }

    #[tokio::test]
    async fn test_absolute_verify_url_under_base_path_skips_refresh() {
        let f = fixture(None);
        f.transport
            .on(Method::GET, "/api/auth/verify", MockReply::unauthorized());

        let response = f
            .fetcher
            .fetch_with_auth(ApiRequest::get("https://portal.example.edu/api/auth/verify"))
            .await
            .unwrap();

        assert!(response.is_unauthorized());
        assert_eq!(f.transport.total_calls(), 1);
        assert_eq!(f.transport.calls(Method::POST, "/auth/refresh"), 0);
        assert_eq!(f.navigator.visit_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_session_refreshes_first() {
        let f = fixture(Some(Duration::from_secs(60)));
        let old = Utc::now() - chrono::Duration::minutes(5);
        f.state.mark_authenticated(f.state.generation(), old);
        f.transport.on(Method::POST, "/auth/refresh", MockReply::ok());
        f.transport.on(Method::GET, "/api/events", MockReply::ok());

        let response = f.fetcher.fetch_with_auth(ApiRequest::get("/api/events")).await.unwrap();

        assert!(response.is_success());
        let requests = f.transport.requests();
        assert_eq!(requests[0].path(), "/auth/refresh");
        assert_eq!(requests[1].path(), "/api/events");
        assert!(f.state.last_verified_at().unwrap() > old);
    }

    #[tokio::test]
    async fn test_stale_refresh_failure_blocks_request() {
        let f = fixture(Some(Duration::from_secs(60)));
        let old = Utc::now() - chrono::Duration::minutes(5);
        f.state.mark_authenticated(f.state.generation(), old);
        f.transport
            .on(Method::POST, "/auth/refresh", MockReply::unauthorized());

        let err = f
            .fetcher
            .fetch_with_auth(ApiRequest::get("/api/events"))
            .await
            .unwrap_err();

        assert!(err.is_auth_error());
        assert_eq!(f.transport.calls(Method::GET, "/api/events"), 0);
    }

    #[tokio::test]
    async fn test_fresh_session_not_refreshed() {
        let f = fixture(Some(Duration::from_secs(60)));
        f.state.mark_authenticated(f.state.generation(), Utc::now());
        f.transport.on(Method::GET, "/api/events", MockReply::ok());

        f.fetcher.fetch_with_auth(ApiRequest::get("/api/events")).await.unwrap();

        assert_eq!(f.transport.calls(Method::POST, "/auth/refresh"), 0);
    }
}
