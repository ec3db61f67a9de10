//! CLI command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use portal_auth::{AuthEndpoints, ReqwestTransport, SessionConfig, SessionManager};
use portal_config::PortalConfig;

use crate::navigator::TerminalNavigator;

pub mod auth;
pub mod config;
pub mod fetch;
pub mod status;

/// Route the CLI pretends to be on when it starts a session.
const CLI_ROUTE: &str = "/cli";

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration, with command-line overrides applied.
    pub config: PortalConfig,
    /// Session cookie to seed the jar with (`name=value`).
    pub cookie: Option<String>,
    /// User config directory override.
    pub config_dir: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Build the session core configuration from the merged config.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let base_url = self
            .config
            .require_base_url()
            .context("No server configured; pass --server or set PORTAL_SERVER_URL")?;
        let auth = self.config.auth();
        let timeouts = self.config.timeouts();

        let defaults = AuthEndpoints::default();
        let endpoints = AuthEndpoints {
            verify: auth.verify.unwrap_or(defaults.verify),
            refresh: auth.refresh.unwrap_or(defaults.refresh),
            who_am_i: auth.who_am_i.unwrap_or(defaults.who_am_i),
            logout: auth.logout.unwrap_or(defaults.logout),
            login: auth.login.unwrap_or(defaults.login),
            login_page: auth.login_page.unwrap_or(defaults.login_page),
            oauth_callback: auth.oauth_callback.unwrap_or(defaults.oauth_callback),
        };

        let mut session = SessionConfig::new(base_url)
            .with_context(|| format!("Invalid server URL '{}'", base_url))?
            .with_endpoints(endpoints)
            .with_request_timeout(timeouts.request_timeout())
            .with_bootstrap_timeout(timeouts.bootstrap_timeout());
        session = match timeouts.stale_after() {
            Some(threshold) => session.with_stale_after(threshold),
            None => session.without_stale_after(),
        };
        if let Some(roles) = auth.admin_roles {
            session = session.with_admin_roles(roles);
        }
        Ok(session)
    }

    /// Start a session against the configured server.
    pub fn session(&self, open_browser: bool) -> Result<SessionManager> {
        let config = self.session_config()?;
        let transport = ReqwestTransport::new(&config)?;
        if let Some(cookie) = &self.cookie {
            transport.add_cookie(cookie);
        }
        let navigator = Arc::new(TerminalNavigator::new(CLI_ROUTE, open_browser));
        Ok(SessionManager::new(config, Arc::new(transport), navigator))
    }
}
