//! Terminal stand-in for browser navigation.

use console::style;
use parking_lot::Mutex;
use portal_auth::Navigator;

/// Prints where the user is being sent and, for absolute URLs, tries to open
/// a browser.
#[derive(Debug)]
pub struct TerminalNavigator {
    current: Mutex<String>,
    open_browser: bool,
}

impl TerminalNavigator {
    /// Create a navigator showing `route`.
    pub fn new(route: &str, open_browser: bool) -> Self {
        Self {
            current: Mutex::new(route.to_string()),
            open_browser,
        }
    }
}

impl Navigator for TerminalNavigator {
    fn navigate(&self, url: &str) {
        if is_external(url) {
            // Leaving for the identity provider; the route stays where it was
            eprintln!("Open this URL in your browser to sign in:");
            eprintln!();
            eprintln!("  {}", style(url).cyan());
            eprintln!();
            if self.open_browser && open_url(url).is_err() {
                eprintln!("(Could not open browser automatically)");
            }
        } else {
            *self.current.lock() = url.to_string();
            eprintln!(
                "{} Session ended. Sign in again with: portal auth login",
                style("→").yellow()
            );
        }
    }

    fn current_path(&self) -> String {
        self.current.lock().clone()
    }
}

fn is_external(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Try to open a URL in the default browser.
fn open_url(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).status()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).status()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .status()?;
    }
    Ok(())
}
