//! Session core error types.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the session core.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The transport failed before a response arrived (offline, DNS, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// The transport gave up waiting for a response.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The session could not be recovered by a refresh.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An auth endpoint answered with a status the pipeline does not handle.
    #[error("Unexpected status {status} from {endpoint}")]
    UnexpectedStatus {
        /// Endpoint path that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// The role lookup failed after the session was established.
    #[error("Role lookup failed: {0}")]
    RoleLookup(String),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Check if this is a transport-level failure (network or timeout).
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Network(_) | AuthError::Timeout(_))
    }

    /// Check if this is an unrecoverable authentication failure.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, AuthError::Authentication(_))
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}

/// Result type for session core operations.
pub type Result<T> = std::result::Result<T, AuthError>;
