//! Observable session state.
//!
//! [`SessionState`] is the single record of authentication status. Writers
//! go through narrow mutators that each touch only the fields they own;
//! readers take a [`SessionSnapshot`] or subscribe to changes.
//!
//! Writes that follow an `.await` capture the session generation first and
//! pass it back in. [`SessionState::reset`] (logout) and
//! [`SessionState::invalidate`] (bootstrap timeout) bump the generation, so a
//! late refresh or bootstrap result can never bring a closed session back.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Whether the server accepted the session.
    pub authenticated: bool,
    /// True only while the initial bootstrap is running.
    pub loading: bool,
    /// Role names from `whoAmI`. Always empty when not authenticated.
    pub roles: BTreeSet<String>,
    /// Last unrecoverable failure, for display.
    pub error: Option<String>,
    /// When the server last confirmed the session.
    pub last_verified_at: Option<DateTime<Utc>>,
    generation: u64,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self {
            authenticated: false,
            loading: true,
            roles: BTreeSet::new(),
            error: None,
            last_verified_at: None,
            generation: 0,
        }
    }

    /// Roles as a sorted list.
    pub fn user_roles(&self) -> Vec<String> {
        self.roles.iter().cloned().collect()
    }

    /// Generation this snapshot belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Shared, observable session record.
#[derive(Debug)]
pub struct SessionState {
    tx: watch::Sender<SessionSnapshot>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Create the state in its pre-bootstrap shape: loading, unauthenticated.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::initial());
        Self { tx }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// Subscribe to changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Current generation; capture before awaiting and pass to guarded writes.
    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }

    /// Whether the session is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().authenticated
    }

    /// Whether the initial bootstrap is still running.
    pub fn is_loading(&self) -> bool {
        self.tx.borrow().loading
    }

    /// Timestamp of the last successful verification.
    pub fn last_verified_at(&self) -> Option<DateTime<Utc>> {
        self.tx.borrow().last_verified_at
    }

    /// Mark the session authenticated, if `generation` is still current.
    ///
    /// Returns false when a logout happened in the meantime and the write was
    /// dropped.
    pub fn mark_authenticated(&self, generation: u64, verified_at: DateTime<Utc>) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            applied = true;
            let changed = !s.authenticated
                || s.error.is_some()
                || s.last_verified_at != Some(verified_at);
            s.authenticated = true;
            s.error = None;
            s.last_verified_at = Some(verified_at);
            changed
        });
        if !applied {
            debug!(generation, "Dropped stale authenticated write");
        }
        applied
    }

    /// Replace the role set, if `generation` is current and the session is
    /// authenticated.
    pub fn set_roles(&self, generation: u64, roles: BTreeSet<String>) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|s| {
            if s.generation != generation || !s.authenticated {
                return false;
            }
            applied = true;
            if s.roles == roles {
                return false;
            }
            s.roles = roles;
            true
        });
        applied
    }

    /// Drop authentication and roles, recording an optional error.
    ///
    /// Clearing is always safe, so it is not generation-guarded.
    pub fn clear(&self, error: Option<String>) {
        self.tx.send_if_modified(|s| {
            let changed = s.authenticated
                || !s.roles.is_empty()
                || (error.is_some() && s.error != error);
            s.authenticated = false;
            s.roles.clear();
            if error.is_some() {
                s.error = error;
            }
            changed
        });
    }

    /// Drop authentication if `generation` is still current, and bump it so
    /// any write still in flight for that generation is discarded.
    ///
    /// Returns false when the generation had already moved on.
    pub fn invalidate(&self, generation: u64, error: Option<String>) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            applied = true;
            s.generation += 1;
            s.authenticated = false;
            s.roles.clear();
            s.last_verified_at = None;
            if error.is_some() {
                s.error = error;
            }
            true
        });
        if applied {
            debug!(generation = generation + 1, "Session invalidated");
        }
        applied
    }

    /// Full reset for logout. Bumps the generation and returns the new one.
    pub fn reset(&self) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|s| {
            s.generation += 1;
            s.authenticated = false;
            s.roles.clear();
            s.error = None;
            s.last_verified_at = None;
            generation = s.generation;
        });
        info!(generation, "Session reset");
        generation
    }

    /// End the loading phase. Idempotent.
    pub fn finish_loading(&self) {
        self.tx.send_if_modified(|s| {
            let was_loading = s.loading;
            s.loading = false;
            was_loading
        });
    }
}
