//! Shared harness for pipeline tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use portal_auth::testing::{MockReply, MockTransport, RecordingNavigator};
use portal_auth::{Method, SessionConfig, SessionManager};
use serde_json::json;

/// A session manager wired to scripted doubles.
pub struct Harness {
    pub session: SessionManager,
    pub transport: Arc<MockTransport>,
    pub navigator: Arc<RecordingNavigator>,
}

impl Harness {
    /// Harness showing `route`, with proactive refresh disabled.
    pub fn at(route: &str) -> Self {
        Self::with_config(route, |config| config.without_stale_after())
    }

    pub fn with_config(route: &str, tweak: impl FnOnce(SessionConfig) -> SessionConfig) -> Self {
        let transport = Arc::new(MockTransport::new());
        let navigator = Arc::new(RecordingNavigator::at(route));
        let config = tweak(
            SessionConfig::new("https://portal.example.edu/api")
                .expect("valid base url")
                .with_bootstrap_timeout(Duration::from_secs(30)),
        );
        let session = SessionManager::new(config, transport.clone(), navigator.clone());
        Self {
            session,
            transport,
            navigator,
        }
    }

    pub fn verify_ok(&self) -> &Self {
        self.transport.on(
            Method::GET,
            "/auth/verify",
            MockReply::json(json!({"authenticated": true})),
        );
        self
    }

    pub fn roles(&self, roles: &[&str]) -> &Self {
        self.transport.on(
            Method::GET,
            "/user/whoAmI",
            MockReply::json(json!({"id": 1001, "username": "asha", "userRoles": roles})),
        );
        self
    }

    /// Bootstrap into an authenticated session with no roles.
    pub async fn signed_in(route: &str) -> Self {
        let harness = Self::at(route);
        harness.verify_ok().roles(&[]);
        harness.session.check_auth().await;
        assert!(harness.session.is_authenticated());
        harness
    }

    pub fn refresh_calls(&self) -> usize {
        self.transport.calls(Method::POST, "/auth/refresh")
    }

    /// Yield until `count` requests have reached `method path`.
    pub async fn wait_for_calls(&self, method: Method, path: &str, count: usize) {
        while self.transport.calls(method.clone(), path) < count {
            tokio::task::yield_now().await;
        }
    }
}
