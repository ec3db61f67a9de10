//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};
use portal_config::{PortalConfig, ServerSection, TimeoutSection};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the merged configuration and where it came from
    Show,

    /// Show the user configuration file path
    Path,

    /// Write a config file with default timeouts
    Init {
        /// Server URL to record
        #[arg(long)]
        server: Option<String>,

        /// Write ./portal.toml instead of the user config
        #[arg(long)]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    let config_dir = ctx.config_dir.clone();
    match args.command {
        ConfigCommand::Show => cmd_show(ctx, config_dir),
        ConfigCommand::Path => cmd_path(config_dir),
        ConfigCommand::Init {
            server,
            local,
            force,
        } => cmd_init(server, local, force, config_dir),
    }
}

fn user_config_path(config_dir: Option<PathBuf>) -> Result<PathBuf> {
    config_dir
        .map(|d| d.join("config.toml"))
        .or_else(portal_config::xdg_config_path)
        .ok_or_else(|| anyhow!("Could not determine config directory"))
}

fn cmd_show(ctx: &Context, config_dir: Option<PathBuf>) -> Result<()> {
    let loaded = portal_config::load_config_with_options(None, config_dir.as_deref())?;

    println!("# Portal Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("# No config files loaded (using defaults)\n");
    } else {
        println!("# Config files (later wins):");
        for source in &sources {
            println!("#   {}", source.display());
        }
        println!();
    }
    for warning in &loaded.warnings {
        println!("# warning: {}", warning);
    }

    // Show the effective values, command-line overrides included
    println!("{}", ctx.config.to_toml()?);
    Ok(())
}

fn cmd_path(config_dir: Option<PathBuf>) -> Result<()> {
    println!("{}", user_config_path(config_dir)?.display());
    Ok(())
}

fn cmd_init(
    server: Option<String>,
    local: bool,
    force: bool,
    config_dir: Option<PathBuf>,
) -> Result<()> {
    let path = if local {
        PathBuf::from("portal.toml")
    } else {
        user_config_path(config_dir)?
    };

    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }

    let config = PortalConfig {
        server: server.map(|url| ServerSection {
            base_url: Some(url),
        }),
        timeouts: Some(TimeoutSection::default()),
        ..Default::default()
    };
    portal_config::save_config(&config, &path)?;

    println!("Wrote {}", path.display());
    Ok(())
}
