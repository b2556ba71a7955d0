//! Config command - View and manage configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use xcgraph_config::ConfigLoader;

use super::{load_config, resolve_path};
use crate::GlobalOptions;

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show(ShowArgs),

    /// Show configuration file paths
    Path(PathArgs),

    /// Write a default configuration file
    Init(InitArgs),
}

/// Arguments for the show command
#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the path command
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the init command
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Write the global config (~/.xcgraph/config.toml) instead of the local one
    #[arg(long)]
    global: bool,
}

/// Configuration paths
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    /// Global config file path
    pub global: Option<PathBuf>,
    /// Local config file path
    pub local: PathBuf,
    /// Explicit config file from --config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explicit: Option<PathBuf>,
    pub global_exists: bool,
    pub local_exists: bool,
}

/// Execute the config command
pub async fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ConfigCommand::Show(args) => execute_show(args, global),
        ConfigCommand::Path(args) => execute_path(args, global),
        ConfigCommand::Init(args) => execute_init(args, global),
    }
}

fn execute_show(args: ShowArgs, global: GlobalOptions) -> Result<()> {
    let root = resolve_path(&global)?;
    let config = load_config(&global, &root)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        let rendered =
            toml::to_string_pretty(&config).context("Failed to render configuration")?;
        print!("{}", rendered);
    }
    Ok(())
}

fn execute_path(args: PathArgs, global: GlobalOptions) -> Result<()> {
    let root = resolve_path(&global)?;
    let loader = ConfigLoader::new();

    let global_path = loader.global_config_path();
    let local = loader.local_config_path(&root);
    let paths = ConfigPaths {
        global_exists: global_path.as_ref().is_some_and(|p| p.exists()),
        global: global_path,
        local_exists: local.exists(),
        local,
        explicit: global.config.clone(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&paths)?);
        return Ok(());
    }

    match paths.global {
        Some(ref path) => println!("global: {}{}", path.display(), missing(paths.global_exists)),
        None => println!("global: (no home directory)"),
    }
    println!("local:  {}{}", paths.local.display(), missing(paths.local_exists));
    if let Some(ref explicit) = paths.explicit {
        println!("file:   {}{}", explicit.display(), missing(explicit.exists()));
    }
    Ok(())
}

fn missing(exists: bool) -> &'static str {
    if exists {
        ""
    } else {
        " (not found)"
    }
}

fn execute_init(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let loader = ConfigLoader::new();

    let path = if args.global {
        loader
            .init_global()
            .context("Failed to initialize global config")?
    } else {
        let root = resolve_path(&global)?;
        loader
            .init_local(&root)
            .context("Failed to initialize local config")?
    };

    println!("Config file: {}", path.display());
    Ok(())
}
