//! Single-flight session refresh.

use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::config::AuthEndpoints;
use crate::redirect::RedirectPolicy;
use crate::registry::OperationRegistry;
use crate::state::SessionState;
use crate::transport::{ApiRequest, SharedTransport};

/// Registry key of the refresh operation.
const REFRESH_KEY: &str = "refresh";

/// How a refresh round trip ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The server issued a new session; the session is authenticated.
    Refreshed,
    /// The server refused (or could not be reached); the session was cleared
    /// and the redirect policy invoked.
    Rejected,
    /// A logout happened while the refresh was in flight; its result was
    /// discarded.
    Superseded,
}

impl RefreshOutcome {
    /// Whether the session is usable again.
    pub fn is_refreshed(self) -> bool {
        matches!(self, RefreshOutcome::Refreshed)
    }
}

/// Deduplicates concurrent refresh attempts into one network call.
///
/// Cheap to clone; clones share the same registry and state.
#[derive(Debug, Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

#[derive(Debug)]
struct CoordinatorInner {
    transport: SharedTransport,
    endpoints: AuthEndpoints,
    state: Arc<SessionState>,
    redirect: RedirectPolicy,
    registry: OperationRegistry<RefreshOutcome>,
}

impl RefreshCoordinator {
    /// Create a coordinator.
    pub fn new(
        transport: SharedTransport,
        endpoints: AuthEndpoints,
        state: Arc<SessionState>,
        redirect: RedirectPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                transport,
                endpoints,
                state,
                redirect,
                registry: OperationRegistry::new(),
            }),
        }
    }

    /// Refresh the session. Resolves `true` if it is usable again.
    pub async fn refresh(&self) -> bool {
        self.refresh_outcome().await.is_refreshed()
    }

    /// Refresh the session, reporting the full outcome.
    ///
    /// Joins the in-flight refresh if there is one; otherwise starts one.
    pub async fn refresh_outcome(&self) -> RefreshOutcome {
        let generation = self.inner.state.generation();
        let inner = Arc::clone(&self.inner);
        let handle = self
            .inner
            .registry
            .join_or_start(REFRESH_KEY, move || inner.run().boxed());

        match handle.await {
            Some(outcome) => outcome,
            // A refresh task that died leaves nothing to trust
            None => self.inner.reject(generation, "Session refresh aborted".to_string()),
        }
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.registry.is_in_flight(REFRESH_KEY)
    }
}

impl CoordinatorInner {
    async fn run(self: Arc<Self>) -> RefreshOutcome {
        let generation = self.state.generation();
        debug!(generation, "Refreshing session");

        let request = ApiRequest::post(self.endpoints.refresh.clone());
        let failure = match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                if self.state.mark_authenticated(generation, Utc::now()) {
                    info!("Session refreshed");
                    return RefreshOutcome::Refreshed;
                }
                debug!("Refresh succeeded for a closed session, discarding");
                return RefreshOutcome::Superseded;
            }
            Ok(response) => format!("Session refresh rejected ({})", response.status),
            Err(e) => format!("Session refresh failed: {}", e),
        };

        self.reject(generation, failure)
    }

    /// Clear the session and send the user to sign in, unless the session
    /// was replaced while the refresh ran.
    fn reject(&self, generation: u64, failure: String) -> RefreshOutcome {
        if self.state.generation() != generation {
            debug!("Refresh failed for a closed session, nothing to clear");
            return RefreshOutcome::Superseded;
        }

        warn!(reason = %failure, "Session could not be refreshed");
        self.state.clear(Some(failure));
        self.redirect.redirect_to_login();
        RefreshOutcome::Rejected
    }
}
