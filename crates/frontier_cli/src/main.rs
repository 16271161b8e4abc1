//! Frontier CLI
//!
//! Command-line tools for frontier queue nodes.
//!
//! # Commands
//!
//! - `inspect` - Display store chain and item statistics for a node directory
//! - `drain` - Pop items from a store and print them
//! - `serve` - Run a queue node server

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Frontier command-line queue tools.
#[derive(Parser)]
#[command(name = "frontier")]
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
    /// Display store statistics for a node data directory
    ///
    /// The node must be offline: inspection opens each store and would
    /// refuse a directory that is still locked.
    Inspect {
        /// Path to the node data directory
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Pop items from one priority store and print them
    Drain {
        /// Path to the node data directory
        path: PathBuf,

        /// Priority class to drain
        #[arg(short, long, default_value = "0")]
        priority: usize,

        /// Maximum number of items to pop
        #[arg(short, long, default_value = "10")]
        size: usize,
    },

    /// Run a queue node server
    Serve {
        /// Address to listen on, also this node's cluster identity
        #[arg(short, long)]
        addr: String,

        /// Path to the node data directory
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Number of priority classes
        #[arg(short = 'p', long, default_value = "2")]
        n_priorities: usize,

        /// Expected distinct labels for the dedup gate (0 disables it)
        #[arg(long, default_value = "1000000")]
        dedup_capacity: u64,
    },
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
        Commands::Inspect { path, format } => {
            commands::inspect::run(&path, &format)?;
        }
        Commands::Drain {
            path,
            priority,
            size,
        } => {
            commands::drain::run(&path, priority, size)?;
        }
        Commands::Serve {
            addr,
            data_dir,
            n_priorities,
            dedup_capacity,
        } => {
            commands::serve::run(&addr, &data_dir, n_priorities, dedup_capacity)?;
        }
    }

    Ok(())
}
