//! DocSync CLI
//!
//! Command-line tools for DocSync client cache files.
//!
//! # Commands
//!
//! - `inspect` - Display cache statistics and entries
//! - `verify` - Check the cache log for torn or undecodable frames
//! - `compact` - Rewrite the log with one frame per live entry
//! - `dump` - Dump log frames for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DocSync cache maintenance tools.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the cache log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display cache statistics
    Inspect {
        /// List every cached document
        #[arg(short, long)]
        entries: bool,

        /// Only list documents with unsynced edits
        #[arg(short, long)]
        dirty: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify cache log integrity
    Verify,

    /// Compact the cache log
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Dump cache log frames for debugging
    Dump {
        /// Maximum number of frames to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip this many frames
        #[arg(short, long, default_value = "0")]
        skip: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect {
            entries,
            dirty,
            format,
        } => {
            let path = cli.path.ok_or("Cache path required for inspect")?;
            commands::inspect::run(&path, entries || dirty, dirty, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Cache path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Cache path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Dump {
            limit,
            skip,
            format,
        } => {
            let path = cli.path.ok_or("Cache path required for dump")?;
            commands::dump::run(&path, limit, skip, &format)?;
        }
        Commands::Version => {
            println!("DocSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
