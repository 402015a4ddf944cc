//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod discover;
mod import;
mod init;
mod media;
mod parity;

use clap::{Parser, Subcommand};

use crate::config::{settings, DiscoveryMode};
use crate::media::PruneMode;

#[derive(Parser)]
#[command(name = "siteport")]
#[command(about = "Legacy WordPress migration and visual parity verification toolkit")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the content database
    Init,

    /// Import pages and posts from the legacy WordPress site
    Import {
        /// Skip media migration even if a storage backend is configured
        #[arg(long)]
        no_media: bool,
    },

    /// Discover the legacy URL inventory and write the discovery payload
    Discover {
        /// Discovery strategy (overrides URL_DISCOVERY_MODE)
        #[arg(short, long, value_enum)]
        mode: Option<DiscoveryMode>,
        /// Skip reachability validation
        #[arg(long)]
        no_validate: bool,
    },

    /// Compare legacy and new pages by screenshot diffing
    Parity {
        /// Number of comparison workers (overrides PARITY_WORKERS)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Compare at most this many URLs
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Manage migrated media storage
    Media {
        #[command(subcommand)]
        command: MediaCommands,
    },
}

#[derive(Subcommand)]
enum MediaCommands {
    /// Delete assets until a target number of bytes has been freed
    Prune {
        /// Bytes to free, e.g. "512mb" (overrides PRUNE_TARGET_FREE)
        #[arg(short, long)]
        target: Option<String>,
        /// Candidate selection mode (overrides PRUNE_MODE)
        #[arg(short, long, value_enum)]
        mode: Option<PruneMode>,
    },
    /// Delete every asset record for the configured provider
    Reset {
        /// Required; resets are not undoable
        #[arg(long)]
        confirm: bool,
    },
    /// Summarize stored assets by size
    Report,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = settings()?;

    match cli.command {
        Commands::Init => init::cmd_init(settings).await,
        Commands::Import { no_media } => import::cmd_import(settings, no_media).await,
        Commands::Discover { mode, no_validate } => {
            discover::cmd_discover(settings, mode, no_validate).await
        }
        Commands::Parity { workers, limit } => parity::cmd_parity(settings, workers, limit).await,
        Commands::Media { command } => match command {
            MediaCommands::Prune { target, mode } => {
                media::cmd_prune(settings, target.as_deref(), mode).await
            }
            MediaCommands::Reset { confirm } => media::cmd_reset(settings, confirm).await,
            MediaCommands::Report => media::cmd_report(settings).await,
        },
    }
}
