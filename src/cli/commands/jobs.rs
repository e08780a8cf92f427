//! Jobs command: query the per-entity audit trail.

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, JobStatus, OutputFormat};
use crate::services::job_log::JobLog;

#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// List the latest recorded job per entity
    List {
        /// Only show jobs with this status (pending, processing, completed, failed)
        #[arg(long)]
        status: Option<JobStatus>,

        /// Maximum entries to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show an entity's full job history
    Show {
        /// Entity identifier
        #[arg(required = true)]
        entity_id: String,
    },
}

pub async fn handle_jobs(cmd: JobsCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let path = config
        .job_log_path()
        .context("could not determine job log path")?;
    if !path.exists() {
        println!(
            "{}",
            formatter.format_message("No job history yet; run the pipeline first.")
        );
        return Ok(());
    }
    let log = JobLog::open(&path).context("failed to open job log")?;

    match cmd {
        JobsCommand::List { status, limit } => {
            let jobs = log.latest_jobs(limit, status);
            print!("{}", formatter.format_jobs(&jobs));
        }
        JobsCommand::Show { entity_id } => {
            let history = log.history_for_entity(&entity_id);
            if history.is_empty() {
                println!(
                    "{}",
                    formatter
                        .format_message(&format!("No job history for entity: {}", entity_id))
                );
                return Ok(());
            }
            print!("{}", formatter.format_jobs(&history));
        }
    }

    Ok(())
}
