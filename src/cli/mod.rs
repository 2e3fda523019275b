//! CLI module for the semantic cache
//!
//! Maintenance subcommands over the configured snapshot pair:
//! - `stats`: print statistics of the persisted cache
//! - `expire`: drop expired entries and save
//! - `compact`: expire, rebuild the index from live entries and save

pub mod maintenance;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// PMP Semantic Cache - maintenance of persisted cache snapshots
#[derive(Parser)]
#[command(name = "pmp-semantic-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file used instead of config/default and config/local
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Print statistics of the persisted cache as JSON
    Stats,

    /// Drop expired entries and save the snapshot
    Expire,

    /// Expire, rebuild the index from live entries and save the snapshot
    Compact,
}
