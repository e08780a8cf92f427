use anyhow::Result;
use console::style;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, EmbeddingDriver, OutputFormat, VectorDriver};
use crate::services::embedder::create_embedding_backend;
use crate::services::job_log::JobLog;
use crate::services::vector_store::create_store_backend;

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let embedding_ready = match create_embedding_backend(&config.embedding) {
        Ok(backend) => backend.health_check().await.unwrap_or(false),
        Err(_) => false,
    };

    let (vector_store_connected, vector_store_points) =
        match create_store_backend(&config.vector_store, config.embedding.dimension).await {
            Ok(store) => {
                let connected = store.health_check().await.unwrap_or(false);
                let points = if connected {
                    store
                        .get_collection_info()
                        .await
                        .ok()
                        .flatten()
                        .map_or(0, |info| info.points_count)
                } else {
                    0
                };
                (connected, points)
            }
            Err(_) => (false, 0),
        };

    let job_counts = config
        .job_log_path()
        .filter(|p| p.exists())
        .and_then(|p| JobLog::open(&p).ok())
        .map(|log| log.counts());

    let embedding_url = match config.embedding.driver {
        EmbeddingDriver::Http => Some(config.embedding.url.clone()),
        EmbeddingDriver::Hash => None,
    };

    let status = StatusInfo {
        embedding_driver: config.embedding.driver.to_string(),
        embedding_url,
        embedding_ready,
        vector_store_driver: config.vector_store.driver.to_string(),
        vector_store_url: config.vector_store.url.clone(),
        vector_store_connected,
        vector_store_points,
        collection: config.vector_store.collection.clone(),
        job_counts,
    };

    print!("{}", formatter.format_status(&status));

    if format == OutputFormat::Text {
        if !embedding_ready && config.embedding.driver == EmbeddingDriver::Http {
            eprintln!(
                "{} embedding server not reachable at {}",
                style("warning:").yellow().bold(),
                config.embedding.url
            );
        }
        if !vector_store_connected && config.vector_store.driver == VectorDriver::Qdrant {
            eprintln!(
                "{} Qdrant not reachable at {}; start it with: docker compose up -d qdrant",
                style("warning:").yellow().bold(),
                config.vector_store.url
            );
        }
    }

    Ok(())
}
