//! Run command: drive the embedding pipeline over a JSONL entity source.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::embedder::{BatchEmbedder, create_embedding_backend};
use crate::services::job_log::JobLog;
use crate::services::orchestrator::Orchestrator;
use crate::services::quality::QualityGate;
use crate::services::vector_store::create_store_backend;
use crate::sources::{EntitySource, JsonlSource, collect_entities};
use crate::utils::retry::with_retry;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to a .jsonl file or a directory of .jsonl files
    #[arg(required = true)]
    pub path: PathBuf,

    /// Maximum number of entities to process
    #[arg(long)]
    pub limit: Option<usize>,

    /// Re-embed entities that already have a stored vector
    #[arg(long)]
    pub re_embed: bool,

    /// List what would be processed without running the pipeline
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn handle_run(args: RunArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let source = JsonlSource::new(&args.path).context("failed to open entity source")?;
    let entities = collect_entities(&source, config.pipeline.batch_size as usize, args.limit)
        .context("failed to read entities")?;

    if verbose {
        println!(
            "Read {} entities from {} source at {}",
            entities.len(),
            source.name(),
            args.path.display()
        );
    }

    if entities.is_empty() {
        println!("{}", formatter.format_message("No entities found to process."));
        return Ok(());
    }

    if args.dry_run {
        println!(
            "{}",
            formatter.format_message(&format!(
                "Dry run: would process {} entities",
                entities.len()
            ))
        );
        if verbose {
            for entity in &entities {
                println!("  {} ({})", entity.id, entity.kind);
            }
        }
        return Ok(());
    }

    let backend = create_embedding_backend(&config.embedding)?;
    let store = create_store_backend(&config.vector_store, config.embedding.dimension).await?;

    // The store may still be coming up; retry the initial setup with
    // backoff before giving up.
    with_retry(&config.pipeline.retry_config(), || store.create_collection())
        .await
        .context("vector store collection setup failed")?;

    let embedder = BatchEmbedder::new(backend, &config.embedding, &config.pipeline);
    let gate = QualityGate::new(&config.quality);

    let mut orchestrator = Orchestrator::new(
        embedder,
        gate,
        Arc::clone(&store),
        config.pipeline.clone(),
    );
    if let Some(path) = config.job_log_path() {
        let log = JobLog::open(&path).context("failed to open job log")?;
        orchestrator = orchestrator.with_job_log(Arc::new(log));
    }
    let orchestrator = Arc::new(orchestrator);

    let mut enqueued = 0u64;
    let mut skipped = 0u64;
    for entity in entities {
        if !args.re_embed && store.fetch(&entity.id).await?.is_some() {
            skipped += 1;
            continue;
        }
        if orchestrator.enqueue(entity) {
            enqueued += 1;
        } else {
            skipped += 1;
        }
    }

    if verbose && skipped > 0 {
        println!(
            "Skipping {} entities already embedded (use --re-embed to overwrite)",
            skipped
        );
    }
    if enqueued == 0 {
        println!(
            "{}",
            formatter.format_message("Nothing to do: all entities are already embedded.")
        );
        return Ok(());
    }

    // Ctrl-C requests cooperative shutdown: the in-flight batch finishes,
    // no new batch starts.
    let shutdown = orchestrator.shutdown_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nShutdown requested; letting the current batch finish...");
            shutdown.store(true, Ordering::Release);
        }
    });

    let pb = ProgressBar::new(enqueued);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap()
            .progress_chars("#>-"),
    );

    let runner = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run().await })
    };

    while !runner.is_finished() {
        pb.set_position(orchestrator.terminal_count());
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let summary = runner.await?;
    pb.finish_and_clear();

    print!("{}", formatter.format_run_summary(&summary));

    if summary.failed > 0 && format == OutputFormat::Text {
        eprintln!(
            "{} {} jobs failed; inspect them with: vpipe jobs list --status failed",
            style("warning:").yellow().bold(),
            summary.failed
        );
    }

    Ok(())
}
