//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [server]
//! base_url = "https://portal.example.edu/api"
//!
//! [auth]
//! refresh = "/auth/refresh"
//! admin_roles = ["ADMIN", "SUPER_ADMIN", "STUDENT_ADMIN"]
//!
//! [timeouts]
//! request_secs = 10
//! bootstrap_secs = 30
//! stale_after_mins = 55   # 0 disables proactive refresh
//!
//! [logging]
//! directory = "~/.local/state/portal/logs"
//! json = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_SECS: u64 = 10;

/// Default bootstrap bound in seconds.
pub const DEFAULT_BOOTSTRAP_SECS: u64 = 30;

/// Default staleness threshold in minutes.
pub const DEFAULT_STALE_AFTER_MINS: u64 = 55;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., a project-local
/// override) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// API server settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSection>,

    /// Endpoint layout and role gate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSection>,

    /// Request, bootstrap and staleness timings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutSection>,

    /// Log file settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSection>,
}

impl PortalConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not field by field.
    pub fn merge(&mut self, other: PortalConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }

        if other.auth.is_some() {
            self.auth = other.auth;
        }

        if other.timeouts.is_some() {
            self.timeouts = other.timeouts;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Configured API base URL, if any layer set one.
    pub fn base_url(&self) -> Option<&str> {
        self.server.as_ref().and_then(|s| s.base_url.as_deref())
    }

    /// Configured API base URL, or an error naming the missing key.
    pub fn require_base_url(&self) -> Result<&str> {
        self.base_url().ok_or_else(|| ConfigError::MissingSetting {
            section: "server".to_string(),
            key: "base_url".to_string(),
        })
    }

    /// Effective timings (section defaults when absent).
    pub fn timeouts(&self) -> TimeoutSection {
        self.timeouts.clone().unwrap_or_default()
    }

    /// Effective auth section (all endpoints defaulted when absent).
    pub fn auth(&self) -> AuthSection {
        self.auth.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// `[server]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// API base URL; endpoint paths are resolved against it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

/// `[auth]` section. Unset keys keep the built-in endpoint layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub who_am_i: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logout: Option<String>,
    /// OAuth authorization entry point.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    /// Application route of the login page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_page: Option<String>,
    /// Application route the OAuth provider returns to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_callback: Option<String>,
    /// Roles that pass the admin gate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_roles: Option<Vec<String>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Timeouts
// ─────────────────────────────────────────────────────────────────────────────

/// `[timeouts]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSection {
    /// Per-request timeout in seconds.
    pub request_secs: u64,
    /// Bound on the startup session check in seconds.
    pub bootstrap_secs: u64,
    /// Refresh before a request when the session was last verified longer
    /// ago than this many minutes. `0` disables.
    pub stale_after_mins: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            request_secs: DEFAULT_REQUEST_SECS,
            bootstrap_secs: DEFAULT_BOOTSTRAP_SECS,
            stale_after_mins: DEFAULT_STALE_AFTER_MINS,
        }
    }
}

impl TimeoutSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_secs)
    }

    /// Staleness threshold, `None` when disabled.
    pub fn stale_after(&self) -> Option<Duration> {
        (self.stale_after_mins > 0).then(|| Duration::from_secs(self.stale_after_mins * 60))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Directory for daily-rotated log files. No file logging when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Write file logs as JSON lines rather than plain text.
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            directory: None,
            json: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = PortalConfig::from_toml(
            r#"
[server]
base_url = "https://portal.example.edu/api"

[auth]
refresh = "/session/renew"
admin_roles = ["WARDEN"]

[timeouts]
request_secs = 5
stale_after_mins = 0

[logging]
directory = "/var/log/portal"
json = false
"#,
        )
        .unwrap();

        assert_eq!(config.base_url(), Some("https://portal.example.edu/api"));
        let auth = config.auth();
        assert_eq!(auth.refresh.as_deref(), Some("/session/renew"));
        assert!(auth.verify.is_none());
        assert_eq!(auth.admin_roles, Some(vec!["WARDEN".to_string()]));

        let timeouts = config.timeouts();
        assert_eq!(timeouts.request_timeout(), Duration::from_secs(5));
        // Unset keys in a present section take their defaults
        assert_eq!(timeouts.bootstrap_secs, DEFAULT_BOOTSTRAP_SECS);
        assert_eq!(timeouts.stale_after(), None);

        let logging = config.logging.unwrap();
        assert_eq!(logging.directory, Some(PathBuf::from("/var/log/portal")));
        assert!(!logging.json);
    }

    #[test]
    fn test_empty_config_defaults() {
        let config = PortalConfig::from_toml("").unwrap();
        assert!(config.base_url().is_none());
        assert!(config.require_base_url().is_err());

        let timeouts = config.timeouts();
        assert_eq!(timeouts.request_timeout(), Duration::from_secs(10));
        assert_eq!(timeouts.bootstrap_timeout(), Duration::from_secs(30));
        assert_eq!(timeouts.stale_after(), Some(Duration::from_secs(55 * 60)));
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base = PortalConfig::from_toml(
            r#"
[server]
base_url = "https://portal.example.edu/api"

[timeouts]
request_secs = 20
"#,
        )
        .unwrap();
        let project = PortalConfig::from_toml(
            r#"
[server]
base_url = "http://localhost:8080"
"#,
        )
        .unwrap();

        base.merge(project);

        assert_eq!(base.base_url(), Some("http://localhost:8080"));
        assert_eq!(base.timeouts().request_secs, 20);
    }

    #[test]
    fn test_toml_round_trip_omits_unset() {
        let config = PortalConfig {
            server: Some(ServerSection {
                base_url: Some("https://portal.example.edu/api".to_string()),
            }),
            ..Default::default()
        };

        let text = config.to_toml().unwrap();
        assert!(text.contains("[server]"));
        assert!(!text.contains("[auth]"));
        assert_eq!(PortalConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_unknown_keys_tolerated() {
        let config = PortalConfig::from_toml(
            r#"
[server]
base_url = "http://localhost:8080"
theme = "dark"
"#,
        )
        .unwrap();
        assert_eq!(config.base_url(), Some("http://localhost:8080"));
    }
}
