//! Keel CLI
//!
//! Command-line tools for Keel operation logs.
//!
//! # Commands
//!
//! - `verify` - Check every frame of a log and report torn tails or corruption
//! - `dump` - Print decoded log records for debugging
//! - `version` - Show version information
//!
//! A path may name a log file or a store directory.

mod commands;

use clap::{Parser, Subcommand};
use commands::dump::Format;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Keel command-line log tools.
#[derive(Parser)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify log integrity
    Verify {
        /// Log file or store directory
        path: PathBuf,
    },

    /// Dump log records for debugging
    Dump {
        /// Log file or store directory
        path: PathBuf,

        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip records before this byte offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Verify { path } => {
            commands::verify::run(&path)?;
        }
        Commands::Dump {
            path,
            limit,
            offset,
            format,
        } => {
            commands::dump::run(&path, limit, offset, format)?;
        }
        Commands::Version => {
            println!("Keel CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Keel Core v{}", keel_core::VERSION);
            println!(
                "Log format v{}, engine v{}",
                keel_core::wal::LOG_VERSION,
                keel_core::ENGINE_VERSION
            );
        }
    }

    Ok(())
}
