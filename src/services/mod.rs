pub mod embedder;
pub mod job_log;
pub mod normalizer;
pub mod orchestrator;
pub mod quality;
pub mod vector_store;

pub use embedder::{BatchEmbedder, EmbeddingBackend, create_embedding_backend};
pub use job_log::{JobCounts, JobLog, JobLogEntry};
pub use normalizer::{NormalizedContent, normalize};
pub use orchestrator::{Orchestrator, RunSummary};
pub use quality::{GateRejection, QualityGate, QualityMetrics};
pub use vector_store::{CollectionInfo, VectorStore, create_store_backend};
