//! Portal - command-line client for the campus portal API.
//!
//! Main entry point for the `portal` CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use portal_config::{PortalConfig, ServerSection};

mod commands;
mod navigator;

use commands::{auth, config, fetch, status};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Portal - command-line client for the campus portal API
#[derive(Parser)]
#[command(name = "portal")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// API base URL (overrides [server] base_url)
    #[arg(long, global = true, env = "PORTAL_SERVER_URL")]
    pub server: Option<String>,

    /// Session cookie to send, as name=value
    #[arg(long, global = true, env = "PORTAL_SESSION_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// User config directory
    #[arg(long, global = true, env = "PORTAL_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify the session and show its state
    Status(status::StatusArgs),

    /// Sign in, sign out, and show identity
    Auth(auth::AuthArgs),

    /// Send an authenticated API request
    Fetch(fetch::FetchArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = portal_config::load_config_with_options(None, cli.config_dir.as_deref())?;
    let mut config = loaded.config;

    let _guard = init_tracing(&config, cli.config_dir.as_deref(), cli.verbose);
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    if let Some(url) = cli.server {
        config.server = Some(ServerSection { base_url: Some(url) });
    }

    // Create context for commands
    let ctx = commands::Context {
        config,
        cookie: cli.cookie,
        config_dir: cli.config_dir,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Auth(args) => auth::run(args, &ctx).await,
        Commands::Fetch(args) => fetch::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

/// Console (human-readable) plus a daily-rolling file log.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(
    config: &PortalConfig,
    config_dir: Option<&std::path::Path>,
    verbose: bool,
) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::prelude::*;

    let filter = if verbose {
        "portal=debug,portal_auth=debug,portal_config=debug,info"
    } else {
        "portal=info,portal_auth=info,portal_config=info,warn"
    };
    let file_filter = "portal=trace,portal_auth=trace,portal_config=trace,info";

    let logging = config.logging.clone().unwrap_or_default();
    let log_dir = logging
        .directory
        .or_else(|| config_dir.map(|d| d.join("logs")))
        .or_else(|| portal_config::xdg_config_dir().map(|d| d.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "portal.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let (json_layer, text_layer) = if logging.json {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_filter(tracing_subscriber::EnvFilter::new(file_filter)),
            ),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking)
                    .with_filter(tracing_subscriber::EnvFilter::new(file_filter)),
            ),
        )
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(json_layer)
        .with(text_layer)
        .init();

    guard
}
