mod config;
mod entity;
mod format;
mod job;
mod vector;

pub use config::{
    Config, DEFAULT_COLLECTION, DEFAULT_DIMENSION, DEFAULT_EMBEDDING_URL, DEFAULT_QDRANT_URL,
    DistanceMetric, EmbeddingConfig, EmbeddingDriver, JobsConfig, MAX_BATCH_SIZE, MIN_BATCH_SIZE,
    PipelineConfig, QualityConfig, VectorDriver, VectorStoreConfig,
};
pub use entity::{Entity, EntityKind};
pub use format::OutputFormat;
pub use job::{EmbeddingJob, JobStatus};
pub use vector::{ScoredRecord, VectorRecord};
