//! Navigation seam.

use std::fmt;
use std::sync::Arc;

/// Moves the user between application routes.
///
/// In a browser this wraps `window.location`; in the CLI it prints the URL
/// and opens a browser.
pub trait Navigator: Send + Sync + fmt::Debug {
    /// Perform a hard navigation to `url` (a route path or absolute URL).
    fn navigate(&self, url: &str);

    /// Path of the route currently displayed.
    fn current_path(&self) -> String;
}

/// A navigator that can be shared across tasks.
pub type SharedNavigator = Arc<dyn Navigator>;
