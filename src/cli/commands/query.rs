//! Query command: similarity search over stored vectors.

use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use crate::cli::output::{QueryResults, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::embedder::{BatchEmbedder, create_embedding_backend};
use crate::services::vector_store::create_store_backend;
use crate::utils::collapse_whitespace;

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Query text
    #[arg(required = true)]
    pub text: String,

    /// Number of nearest records to return
    #[arg(long, short = 'k', default_value_t = 10)]
    pub limit: usize,
}

pub async fn handle_query(args: QueryArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let started = Instant::now();

    // Queries go through the same normalization as indexed content
    let normalized = collapse_whitespace(&args.text);
    if normalized.is_empty() {
        anyhow::bail!("query text is empty");
    }

    let backend = create_embedding_backend(&config.embedding)?;
    let embedder = BatchEmbedder::new(backend, &config.embedding, &config.pipeline);
    let vector = embedder
        .embed_one(&normalized)
        .await
        .context("failed to embed query")?;

    let store = create_store_backend(&config.vector_store, config.embedding.dimension).await?;
    let results = store
        .query(vector, args.limit)
        .await
        .context("vector store query failed")?;

    let results = QueryResults {
        query: normalized,
        results,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    print!("{}", formatter.format_query_results(&results));

    Ok(())
}
