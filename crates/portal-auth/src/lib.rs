//! Session core for the campus portal.
//!
//! Every authenticated API call goes through one pipeline:
//!
//! - [`SessionBootstrapper`] verifies the session once on load, refreshing
//!   it if it expired, and loads the user's roles.
//! - [`AuthenticatedFetcher`] sends domain calls. On a 401 it asks the
//!   [`RefreshCoordinator`] for a new session and replays the call once.
//! - [`RefreshCoordinator`] collapses concurrent refresh attempts into a
//!   single network call whose outcome every caller shares.
//! - [`RedirectPolicy`] sends the user to the login page when the session is
//!   lost, except on the login and OAuth callback routes.
//!
//! [`SessionManager`] wires these together around one [`SessionState`] and
//! is what the rest of the application talks to.
//!
//! The network and the browser are reached through the [`Transport`] and
//! [`Navigator`] traits. [`ReqwestTransport`] is the production transport;
//! the `testing` feature adds scripted doubles for both.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod manager;
pub mod navigator;
pub mod redirect;
pub mod refresh;
pub mod registry;
pub mod roles;
pub mod state;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bootstrap::{BootstrapOutcome, SessionBootstrapper, UserId, UserIdentity, VerifyStatus};
pub use config::{AuthEndpoints, SessionConfig};
pub use error::{AuthError, Result};
pub use fetcher::AuthenticatedFetcher;
pub use manager::SessionManager;
pub use navigator::{Navigator, SharedNavigator};
pub use redirect::RedirectPolicy;
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use registry::OperationRegistry;
pub use roles::has_admin_role;
pub use state::{SessionSnapshot, SessionState};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, SharedTransport, Transport};

// Re-exported so callers can build requests without naming reqwest.
pub use reqwest::{Method, StatusCode};
