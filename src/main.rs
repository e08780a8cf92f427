use anyhow::Result;
use clap::Parser;

use vpipe::cli::commands::{handle_config, handle_jobs, handle_query, handle_run, handle_status};
use vpipe::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    let verbose = cli.verbose;

    match cli.command {
        Commands::Status => handle_status(format, verbose).await?,
        Commands::Run(args) => handle_run(args, format, verbose).await?,
        Commands::Query(args) => handle_query(args, format, verbose).await?,
        Commands::Jobs(cmd) => handle_jobs(cmd, format, verbose).await?,
        Commands::Config(cmd) => handle_config(cmd, format, verbose).await?,
    }

    Ok(())
}
