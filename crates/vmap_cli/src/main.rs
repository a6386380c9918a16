//! vmap CLI
//!
//! Command-line tools for vmap stores. Every command reads `journal.log`
//! without taking the store lock and never writes to it.
//!
//! # Commands
//!
//! - `inspect` - Display journal statistics and per-tree summaries
//! - `verify` - Verify journal integrity
//! - `roots` - List the signed roots of a tree
//! - `get` - Read one key of a tree
//! - `dump-journal` - Dump journal frames for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// vmap command-line store tools.
#[derive(Parser)]
#[command(name = "vmap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
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
    /// Display journal statistics and per-tree summaries
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify journal integrity
    Verify {
        /// Treat a torn or unfinished tail as a failure
        #[arg(short, long)]
        strict: bool,
    },

    /// List the signed roots of a tree
    Roots {
        /// Tree ID
        #[arg(short, long)]
        tree: i64,

        /// First revision to list
        #[arg(long, default_value = "1")]
        from: u64,

        /// Maximum number of roots to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Read one key of a tree
    Get {
        /// Tree ID
        #[arg(short, long)]
        tree: i64,

        /// Key to read
        #[arg(short, long)]
        key: String,

        /// Interpret the key as hex
        #[arg(long)]
        hex: bool,

        /// Revision to read (-1 for latest)
        #[arg(short, long, default_value = "-1", allow_negative_numbers = true)]
        revision: i64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump journal frames for debugging
    DumpJournal {
        /// Maximum number of frames to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
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
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify { strict } => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path, strict)?;
        }
        Commands::Roots {
            tree,
            from,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for roots")?;
            commands::roots::run(&path, tree, from, limit, &format)?;
        }
        Commands::Get {
            tree,
            key,
            hex,
            revision,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for get")?;
            let key = commands::parse_key(&key, hex)?;
            commands::get::run(&path, tree, &key, revision, &format)?;
        }
        Commands::DumpJournal {
            limit,
            offset,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for dump-journal")?;
            commands::dump_journal::run(&path, limit, offset, &format)?;
        }
        Commands::Version => {
            println!("vmap CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("vmap core v{}", vmap_core::VERSION);
        }
    }

    Ok(())
}
