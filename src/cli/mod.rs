//! CLI module for the embedding pipeline.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Batched embedding generation and vector store ingestion pipeline.
#[derive(Debug, Parser)]
#[command(name = "vpipe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        env = "VPIPE_FORMAT",
        help = "Output format: text or json"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check infrastructure status (embedding backend, vector store, job log)
    Status,

    /// Run the embedding pipeline over a JSONL entity source
    Run(commands::RunArgs),

    /// Find the stored records nearest to a query text
    Query(commands::QueryArgs),

    /// Inspect per-entity job history
    #[command(subcommand)]
    Jobs(commands::JobsCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
