//! Status command - verifies the session and shows its state.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use console::{Style, style};
use portal_auth::BootstrapOutcome;
use serde::Serialize;

use super::Context;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {}

/// Status for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput {
    server_url: String,
    authenticated: bool,
    roles: Vec<String>,
    admin: bool,
    last_verified_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

/// Run the status command.
pub async fn run(_args: StatusArgs, ctx: &Context) -> Result<()> {
    let session = ctx.session(false)?;
    let outcome = session.check_auth().await;
    let snapshot = session.snapshot();

    let output = StatusOutput {
        server_url: session.config().base_url.to_string(),
        authenticated: snapshot.authenticated,
        roles: snapshot.user_roles(),
        admin: session.has_admin_role(),
        last_verified_at: snapshot.last_verified_at,
        error: snapshot.error.clone(),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Portal Session Status").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Server:"), output.server_url);

    if output.authenticated {
        println!(
            "  {} {}",
            dim.apply_to("Session:"),
            Style::new().green().apply_to("● signed in")
        );
        let roles = if output.roles.is_empty() {
            "(none)".to_string()
        } else {
            output.roles.join(", ")
        };
        println!("  {} {}", dim.apply_to("Roles:"), roles);
        println!(
            "  {} {}",
            dim.apply_to("Admin:"),
            if output.admin { "yes" } else { "no" }
        );
        if let Some(at) = output.last_verified_at {
            println!("  {} {}", dim.apply_to("Verified:"), at.to_rfc3339());
        }
    } else {
        println!(
            "  {} {}",
            dim.apply_to("Session:"),
            Style::new().red().apply_to("● not signed in")
        );
        if let Some(error) = &output.error {
            println!("  {} {}", dim.apply_to("Error:"), error);
        }
        if ctx.verbose && outcome == BootstrapOutcome::TimedOut {
            println!("  {} server did not answer in time", dim.apply_to("Note:"));
        }
    }
    println!();

    Ok(())
}
