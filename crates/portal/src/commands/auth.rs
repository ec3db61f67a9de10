//! Auth command - sign in, sign out, and identity.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use console::style;
use serde::Serialize;

use super::Context;

/// Arguments for the auth command.
#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Open the portal sign-in page
    Login {
        /// Print the URL without opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// End the session on the server
    Logout,

    /// Show the signed-in user and their roles
    Whoami,
}

/// Run the auth command.
pub async fn run(args: AuthArgs, ctx: &Context) -> Result<()> {
    match args.command {
        AuthCommand::Login { no_browser } => cmd_login(!no_browser, ctx),
        AuthCommand::Logout => cmd_logout(ctx).await,
        AuthCommand::Whoami => cmd_whoami(ctx).await,
    }
}

fn cmd_login(open_browser: bool, ctx: &Context) -> Result<()> {
    let session = ctx.session(open_browser)?;
    session.login()?;

    println!("After signing in, copy the session cookie from your browser and run:");
    println!();
    println!("  export PORTAL_SESSION_COOKIE='<name>=<value>'");
    println!();
    Ok(())
}

async fn cmd_logout(ctx: &Context) -> Result<()> {
    if ctx.cookie.is_none() {
        println!("No session cookie set; nothing to sign out.");
        return Ok(());
    }

    let session = ctx.session(false)?;
    session.logout().await;
    println!("Signed out.");
    Ok(())
}

/// Identity for JSON output.
#[derive(Debug, Serialize)]
struct WhoamiOutput {
    id: String,
    username: String,
    roles: Vec<String>,
    admin: bool,
}

async fn cmd_whoami(ctx: &Context) -> Result<()> {
    let session = ctx.session(false)?;
    if !session.check_auth().await.is_authenticated() {
        bail!(
            "Not signed in: {}",
            session.error().unwrap_or_else(|| "no session".to_string())
        );
    }

    let Some(identity) = session.identity() else {
        bail!("Signed in, but the user lookup failed");
    };

    let output = WhoamiOutput {
        id: identity.id.to_string(),
        username: identity.username,
        roles: session.user_roles(),
        admin: session.has_admin_role(),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{} (id {})", style(&output.username).bold(), output.id);
        if output.roles.is_empty() {
            println!("  roles: (none)");
        } else {
            println!("  roles: {}", output.roles.join(", "));
        }
        if output.admin {
            println!("  {}", style("administrator").yellow());
        }
    }
    Ok(())
}
