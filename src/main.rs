//! supervisor-chat - terminal chat between a coordinator and field supervisors
//!
//! REST backend for contacts and history, a Socket.IO connection for
//! real-time fan-out and a Pusher channel for new-message notifications.

mod api;
mod chat;
mod config;
mod models;
mod realtime;
mod tui;

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat::ReconcilePolicy;
use config::{Config, ConfigUpdate};

#[derive(Parser)]
#[command(name = "supervisor-chat")]
#[command(about = "Chat with field supervisors from the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the supervisors linked to the configured coordinator
    Contacts {
        /// Maximum number of contacts to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Read the conversation with a contact
    Read {
        /// Contact id or (part of) the name
        contact: String,

        /// Maximum number of messages to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Send a message (requires the socket connection)
    Send {
        /// Contact id or (part of) the name
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,
    },

    /// Print real-time events until Ctrl-C
    Listen,

    /// Show configuration and connectivity
    Status,

    /// Update stored settings
    Configure {
        /// REST backend base URL
        #[arg(long)]
        api_url: Option<String>,

        /// Socket.IO origin
        #[arg(long)]
        socket_url: Option<String>,

        /// Logged-in coordinator id
        #[arg(long)]
        coordinator: Option<String>,

        /// Bearer token for the REST backend
        #[arg(long)]
        token: Option<String>,

        /// Pusher application key
        #[arg(long)]
        pusher_key: Option<String>,

        /// Pusher cluster (e.g. sa1)
        #[arg(long)]
        pusher_cluster: Option<String>,

        /// Self-hosted Pusher-compatible host, overrides the cluster
        #[arg(long)]
        pusher_host: Option<String>,

        /// Notification channel name
        #[arg(long)]
        channel: Option<String>,

        /// How polled history is folded into the view
        #[arg(long, value_enum)]
        reconcile: Option<ReconcilePolicy>,
    },

    /// Launch the terminal user interface
    Tui,
}

/// Stderr logging for CLI commands.
fn init_cli_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// File logging for the TUI, so output does not corrupt the alternate screen.
fn init_tui_logging(verbose: bool) -> Result<()> {
    let dir = Config::data_dir()?;
    fs::create_dir_all(&dir).context("Failed to create data directory")?;
    let path = dir.join("tui.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Tui) {
        init_tui_logging(cli.verbose)?;
    } else {
        init_cli_logging(cli.verbose);
    }

    let config = Config::load()?;

    match cli.command {
        Commands::Contacts { limit } => {
            tracing::info!("Fetching contacts...");
            api::list_contacts(&config, limit).await?;
        }
        Commands::Read { contact, limit } => {
            api::read_conversation(&config, &contact, limit).await?;
        }
        Commands::Send { to, message } => {
            tracing::info!("Sending message...");
            api::send_message(&config, &to, &message).await?;
        }
        Commands::Listen => {
            realtime::listen(&config).await?;
        }
        Commands::Status => {
            api::status(&config).await?;
        }
        Commands::Configure {
            api_url,
            socket_url,
            coordinator,
            token,
            pusher_key,
            pusher_cluster,
            pusher_host,
            channel,
            reconcile,
        } => {
            let mut config = config;
            let changed = config.apply(ConfigUpdate {
                api_url,
                socket_url,
                coordinator,
                token,
                reconcile,
                pusher_key,
                pusher_cluster,
                pusher_host,
                channel,
            });
            if changed {
                config.save()?;
                println!("Saved {}", Config::config_path()?.display());
            } else {
                println!("Nothing to change.");
            }
        }
        Commands::Tui => {
            tui::run(config).await?;
        }
    }

    Ok(())
}
