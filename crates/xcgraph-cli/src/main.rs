//! xcgraph CLI - Dependency graphs of Xcode-style projects
//!
//! Loads a workspace or project into a dependency graph, runs the mapper
//! pipeline and answers queries about linking, embedding and caching.
//!
//! # Usage
//!
//! ```bash
//! # Load and map the graph of the current directory
//! xcgraph graph
//!
//! # What does App link?
//! xcgraph query linkable App
//!
//! # Which targets have a cached binary?
//! xcgraph cache status
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use xcgraph_config::{ConfigOverrides, IncompatibleConditionPolicy, LogFormat, LoggingConfig};

mod commands;
mod progress;

/// xcgraph - Dependency graph loading, traversal and binary caching
#[derive(Parser, Debug)]
#[command(name = "xcgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Directory holding the workspace or project manifest (default: current directory)
    #[arg(long, short = 'p', global = true, env = "XCGRAPH_PATH")]
    path: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, short = 'c', global = true, env = "XCGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Artifact directory of the binary cache
    #[arg(long, global = true, env = "XCGRAPH_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Keep the declared platforms of external targets
    #[arg(long, global = true)]
    no_narrowing: bool,

    /// Policy for conditions that share no platform with their consumer (error, warn)
    #[arg(long, global = true, value_parser = parse_policy)]
    on_incompatible: Option<IncompatibleConditionPolicy>,

    /// Target to always build from source (repeatable)
    #[arg(long = "source", global = true)]
    sources: Vec<String>,
}

fn parse_policy(s: &str) -> Result<IncompatibleConditionPolicy, String> {
    s.parse()
        .map_err(|e: xcgraph_config::ConfigError| e.to_string())
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            cache_dir: self.cache_dir.clone(),
            narrowing_enabled: self.no_narrowing.then_some(false),
            on_incompatible: self.on_incompatible,
            sources: self.sources.clone(),
            log_level: None,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the graph and run the mapper pipeline
    Graph(commands::graph::GraphArgs),

    /// Query targets and their dependencies
    Query(commands::query::QueryArgs),

    /// Inspect and fill the binary cache
    #[command(subcommand)]
    Cache(commands::cache::CacheCommand),

    /// View and manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging follows the configuration when it loads; the command reports the error otherwise
    let logging = commands::resolve_path(&cli.global)
        .and_then(|root| commands::load_config(&cli.global, &root))
        .map(|config| config.logging)
        .unwrap_or_default();
    init_logging(&cli.global, &logging)?;

    match cli.command {
        Commands::Graph(args) => commands::graph::execute(args, cli.global).await,
        Commands::Query(args) => commands::query::execute(args, cli.global).await,
        Commands::Cache(cmd) => commands::cache::execute(cmd, cli.global).await,
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global).await,
    }
}

fn init_logging(global: &GlobalOptions, logging: &LoggingConfig) -> Result<()> {
    let filter = if global.quiet {
        EnvFilter::new("error")
    } else if global.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = FmtSubscriber::builder().with_env_filter(filter);

    let file = match logging.file {
        Some(ref path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?,
        ),
        None => None,
    };

    match (&logging.format, file) {
        (LogFormat::Json, Some(file)) => tracing::subscriber::set_global_default(
            builder
                .json()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .finish(),
        )?,
        (LogFormat::Json, None) => tracing::subscriber::set_global_default(
            builder.json().with_writer(std::io::stderr).finish(),
        )?,
        (LogFormat::Text, Some(file)) => tracing::subscriber::set_global_default(
            builder
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .finish(),
        )?,
        (LogFormat::Text, None) => tracing::subscriber::set_global_default(
            builder.with_writer(std::io::stderr).with_ansi(true).finish(),
        )?,
    }
    Ok(())
}
