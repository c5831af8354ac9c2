//! PharmaDesk shell - hosts the session monitor in a terminal
//!
//! Stands in for the dashboard's application shell during frontend-only
//! development: mock identity backend, file-backed local storage, and
//! notices printed to the terminal.

mod config;
mod repl;
mod terminal;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pharmadesk_session::FileStore;

use crate::config::{resolve_config_path, DemoUser, ShellConfig};
use crate::repl::Shell;

/// PharmaDesk session shell
#[derive(Parser)]
#[command(name = "pharmadesk")]
#[command(about = "Session activity monitor for the PharmaDesk back-office")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the shell configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session
    Run {
        /// Extra mock account as EMAIL:PASSWORD (repeatable)
        #[arg(long = "demo-user")]
        demo_users: Vec<String>,
    },

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default configuration (overwrites with --force)
    Init {
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pharmadesk=info,pharmadesk_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);

    match cli.command {
        Commands::Run { demo_users } => {
            let mut config = ShellConfig::load_or_create(&config_path)?;
            for raw in &demo_users {
                config.demo_users.push(DemoUser::parse(raw)?);
            }

            info!("Starting PharmaDesk shell v{}", env!("CARGO_PKG_VERSION"));
            let store = FileStore::open(config.storage_path.clone())
                .with_context(|| format!("Failed to open storage {:?}", config.storage_path))?;

            let mut shell = Shell::new(config, Arc::new(store))?;
            shell.run().await?;
        }

        Commands::Config(ConfigCommands::Init { force }) => {
            if config_path.exists() && !force {
                println!("Config already exists at {:?} (use --force to overwrite)", config_path);
            } else {
                ShellConfig::default().save(&config_path)?;
                println!("Wrote default config to {:?}", config_path);
            }
        }

        Commands::Config(ConfigCommands::Show) => {
            let config = if config_path.exists() {
                ShellConfig::load_or_create(&config_path)?
            } else {
                ShellConfig::default()
            };
            println!("# {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
