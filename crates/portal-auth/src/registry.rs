//! Single-flight operation registry.
//!
//! Maps an operation key to the shared handle of its in-flight run. The
//! first caller for a key spawns the work; every caller that arrives before
//! it settles gets a clone of the same handle and observes the same output.
//! The entry is removed when the work finishes, so the next caller after
//! that starts a fresh run.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// Shared handle to an in-flight operation.
///
/// Resolves to `None` if the operation's task panicked or was aborted.
pub type OperationHandle<T> = Shared<BoxFuture<'static, Option<T>>>;

struct InFlight<T: Clone> {
    id: u64,
    handle: OperationHandle<T>,
}

type Entries<T> = Arc<Mutex<HashMap<&'static str, InFlight<T>>>>;

/// Registry of in-flight single-flight operations with outputs of type `T`.
pub struct OperationRegistry<T: Clone> {
    entries: Entries<T>,
    next_id: AtomicU64,
}

impl<T: Clone> Default for OperationRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T: Clone> std::fmt::Debug for OperationRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&'static str> = self.entries.lock().keys().copied().collect();
        f.debug_struct("OperationRegistry")
            .field("in_flight", &keys)
            .finish()
    }
}

impl<T> OperationRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight operation for `key`, or start one with `start`.
    ///
    /// `start` is only called when nothing is in flight. The work runs on its
    /// own task so it settles even if every caller stops waiting.
    pub fn join_or_start<F>(&self, key: &'static str, start: F) -> OperationHandle<T>
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let mut entries = self.entries.lock();
        if let Some(in_flight) = entries.get(key) {
            debug!(operation = key, id = in_flight.id, "Joining in-flight operation");
            return in_flight.handle.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let settle = Settle {
            entries: Arc::clone(&self.entries),
            key,
            id,
        };
        let work = start();
        let task = tokio::spawn(async move {
            // Dropped after `work` completes or unwinds, before waiters wake
            let _settle = settle;
            work.await
        });

        let handle = async move {
            match task.await {
                Ok(output) => Some(output),
                Err(e) => {
                    warn!(operation = key, id, error = %e, "Operation task failed");
                    None
                }
            }
        }
        .boxed()
        .shared();

        trace!(operation = key, id, "Started operation");
        entries.insert(
            key,
            InFlight {
                id,
                handle: handle.clone(),
            },
        );
        handle
    }

    /// Whether an operation is in flight for `key`.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

/// Removes a registry entry when the owning task ends.
struct Settle<T: Clone> {
    entries: Entries<T>,
    key: &'static str,
    id: u64,
}

impl<T: Clone> Drop for Settle<T> {
    fn drop(&mut self) {
        let mut entries = self.entries.lock();
        // Only remove our own run; a newer one may already be registered
        if entries.get(self.key).is_some_and(|e| e.id == self.id) {
            entries.remove(self.key);
            trace!(operation = self.key, id = self.id, "Operation settled");
        }
    }
}
