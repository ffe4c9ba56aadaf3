//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod channels;
pub mod config;
pub mod gateway;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use clawgate::config::Config;

#[derive(Parser)]
#[command(name = "clawgate")]
#[command(version)]
#[command(about = "Multi-platform chat gateway", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.clawgate/config.json
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway and run until Ctrl+C
    Gateway {
        /// Reply to every message with its own content
        #[arg(long)]
        echo: bool,
    },
    /// List configured channels
    Channels,
    /// Inspect the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Check configuration for errors and warnings
    Check,
}

/// Resolves `--config`, falling back to the default location.
pub(crate) fn config_path(flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf).unwrap_or_else(Config::path)
}

/// Loads the configuration file with environment overrides applied.
pub(crate) fn load_config(path: &Path) -> Result<Config> {
    Config::load_from_path(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

fn cmd_version() {
    println!("clawgate {}", env!("CARGO_PKG_VERSION"));
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let path = config_path(cli.config.as_deref());

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Gateway { echo }) => {
            let config = load_config(&path)?;
            clawgate::utils::logging::init_logging(&config.logging)
                .context("Failed to initialize logging")?;
            gateway::cmd_gateway(config, echo).await?;
        }
        Some(Commands::Channels) => {
            let config = load_config(&path)?;
            channels::cmd_channels(&config);
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action, &path)?;
        }
    }

    Ok(())
}
