//! Vector store abstraction layer.
//!
//! Trait-based abstraction over vector store backends, allowing the
//! pipeline to switch between the in-process store and Qdrant based on
//! configuration.

mod memory;
mod qdrant;

pub use memory::MemoryBackend;
pub use qdrant::QdrantBackend;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::VectorStoreError;
use crate::models::{ScoredRecord, VectorDriver, VectorRecord, VectorStoreConfig};

/// Collection information.
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub points_count: u64,
}

/// Abstract trait for vector store operations.
///
/// Upserts must be safe under concurrent calls for different entity ids;
/// the orchestrator guarantees at most one in-flight job per entity id,
/// so same-id write races never occur.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check if the vector store is healthy and accessible.
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Get information about the current collection.
    /// Returns None if the collection doesn't exist.
    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError>;

    /// Create the collection if it doesn't exist.
    async fn create_collection(&self) -> Result<(), VectorStoreError>;

    /// Insert records, overwriting any existing record with the same
    /// entity id and refreshing its insertion timestamp.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError>;

    /// Look up the record for one entity id.
    async fn fetch(&self, entity_id: &str) -> Result<Option<VectorRecord>, VectorStoreError>;

    /// Return the `k` records closest to the query vector under the
    /// configured metric, ties broken by insertion timestamp ascending.
    async fn query(
        &self,
        vector: Vec<f32>,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError>;

    /// Get the collection name.
    fn collection(&self) -> &str;
}

/// Create a vector store backend based on configuration.
pub async fn create_store_backend(
    config: &VectorStoreConfig,
    dimension: u32,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    match config.driver {
        VectorDriver::Memory => Ok(Arc::new(MemoryBackend::new(config))),
        VectorDriver::Qdrant => {
            let backend = QdrantBackend::new(config, u64::from(dimension))?;
            Ok(Arc::new(backend))
        }
    }
}
