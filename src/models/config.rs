use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "vpipe_vectors";
pub const DEFAULT_DIMENSION: u32 = 512;

/// Allowed range for the pipeline batch size.
pub const MIN_BATCH_SIZE: u32 = 16;
pub const MAX_BATCH_SIZE: u32 = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub jobs: JobsConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vpipe").join("config.toml"))
    }

    /// Load configuration from disk, falling back to defaults.
    ///
    /// Validation runs on whatever was loaded: a config that is present but
    /// out of range rejects the process before any jobs run.
    pub fn load() -> Result<Self, ConfigError> {
        let config = if let Some(path) = Self::config_path()
            && path.exists()
        {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Reject configurations no pipeline run could honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.pipeline.batch_size) {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.batch_size must be between {} and {}, got {}",
                MIN_BATCH_SIZE, MAX_BATCH_SIZE, self.pipeline.batch_size
            )));
        }
        if self.pipeline.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_retries must be greater than zero".to_string(),
            ));
        }
        if self.pipeline.concurrency_limit == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.concurrency_limit must be greater than zero".to_string(),
            ));
        }
        if self.quality.norm_min >= self.quality.norm_max {
            return Err(ConfigError::ValidationError(format!(
                "quality.norm_min ({}) must be below quality.norm_max ({})",
                self.quality.norm_min, self.quality.norm_max
            )));
        }
        if self.quality.max_dead_fraction <= 0.0 || self.quality.max_dead_fraction > 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "quality.max_dead_fraction must be in (0, 1], got {}",
                self.quality.max_dead_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.quality.coherence_threshold) {
            return Err(ConfigError::ValidationError(format!(
                "quality.coherence_threshold must be between 0 and 1, got {}",
                self.quality.coherence_threshold
            )));
        }
        Ok(())
    }

    /// Resolve the job audit log path, creating a default under the user's
    /// data directory when none is configured.
    pub fn job_log_path(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.jobs.log_path {
            return Some(path.clone());
        }
        dirs::data_dir().map(|p| p.join("vpipe").join("jobs.db"))
    }
}

/// Which embedding backend produces vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingDriver {
    /// External embedding server over HTTP
    #[default]
    Http,
    /// Deterministic local driver, no external dependencies
    Hash,
}

impl std::fmt::Display for EmbeddingDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingDriver::Http => write!(f, "http"),
            EmbeddingDriver::Hash => write!(f, "hash"),
        }
    }
}

impl std::str::FromStr for EmbeddingDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(EmbeddingDriver::Http),
            "hash" => Ok(EmbeddingDriver::Hash),
            _ => Err(format!("unknown embedding driver: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub driver: EmbeddingDriver,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_DIMENSION
}

fn default_timeout() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            driver: EmbeddingDriver::default(),
            url: default_embedding_url(),
            dimension: default_dimension(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_batch_size() -> u32 {
    64
}

fn default_max_retries() -> u32 {
    3
}

fn default_concurrency_limit() -> u32 {
    4
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            concurrency_limit: default_concurrency_limit(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl PipelineConfig {
    /// Backoff schedule for requeued jobs.
    pub fn retry_config(&self) -> crate::utils::retry::RetryConfig {
        crate::utils::retry::RetryConfig::new(self.max_retries)
            .with_initial_delay(std::time::Duration::from_millis(self.backoff_base_ms))
            .with_max_delay(std::time::Duration::from_millis(self.backoff_max_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_norm_min")]
    pub norm_min: f32,

    #[serde(default = "default_norm_max")]
    pub norm_max: f32,

    /// Reject vectors whose fraction of near-zero components reaches this
    /// value. 1.0 disables the rule (needed for one-hot test embedders).
    #[serde(default = "default_max_dead_fraction")]
    pub max_dead_fraction: f32,

    #[serde(default = "default_coherence_threshold")]
    pub coherence_threshold: f32,
}

fn default_norm_min() -> f32 {
    0.1
}

fn default_norm_max() -> f32 {
    10.0
}

fn default_max_dead_fraction() -> f32 {
    0.5
}

fn default_coherence_threshold() -> f32 {
    0.95
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            norm_min: default_norm_min(),
            norm_max: default_norm_max(),
            max_dead_fraction: default_max_dead_fraction(),
            coherence_threshold: default_coherence_threshold(),
        }
    }
}

/// Which vector store backend persists records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    /// In-process store, useful for local runs and tests
    #[default]
    Memory,
    /// Qdrant over gRPC
    Qdrant,
}

impl std::fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDriver::Memory => write!(f, "memory"),
            VectorDriver::Qdrant => write!(f, "qdrant"),
        }
    }
}

impl std::str::FromStr for VectorDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(VectorDriver::Memory),
            "qdrant" => Ok(VectorDriver::Qdrant),
            _ => Err(format!("unknown vector store driver: {}", s)),
        }
    }
}

/// Distance metric for similarity queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    InnerProduct,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::InnerProduct => write!(f, "inner_product"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub metric: DistanceMetric,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::default(),
            url: default_qdrant_url(),
            collection: default_collection(),
            metric: DistanceMetric::default(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobsConfig {
    /// Override for the sqlite job history location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.embedding.dimension, DEFAULT_DIMENSION);
        assert_eq!(config.pipeline.batch_size, 64);
        assert_eq!(config.quality.coherence_threshold, 0.95);
        assert_eq!(config.vector_store.collection, DEFAULT_COLLECTION);
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut config = Config::default();
        config.pipeline.batch_size = 8;
        assert!(config.validate().is_err());
        config.pipeline.batch_size = 2048;
        assert!(config.validate().is_err());
        config.pipeline.batch_size = 16;
        assert!(config.validate().is_ok());
        config.pipeline.batch_size = 1024;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let mut config = Config::default();
        config.embedding.dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_norm_bounds_ordering() {
        let mut config = Config::default();
        config.quality.norm_min = 5.0;
        config.quality.norm_max = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_coherence_threshold_range() {
        let mut config = Config::default();
        config.quality.coherence_threshold = 1.5;
        assert!(config.validate().is_err());
        config.quality.coherence_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            batch_size = 32

            [vector_store]
            driver = "qdrant"
            metric = "inner_product"
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.batch_size, 32);
        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.vector_store.driver, VectorDriver::Qdrant);
        assert_eq!(config.vector_store.metric, DistanceMetric::InnerProduct);
    }
}
