//! Persisted vector records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unit of persistence in the vector store, keyed by entity id.
///
/// Immutable once written; a re-embedding run overwrites the whole record
/// through the store's upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub entity_id: String,
    pub vector: Vec<f32>,
    pub metadata: serde_json::Value,
    pub inserted_at: DateTime<Utc>,
}

impl VectorRecord {
    pub fn new(
        entity_id: impl Into<String>,
        vector: Vec<f32>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            vector,
            metadata,
            inserted_at: Utc::now(),
        }
    }
}

/// A record paired with its distance to a query vector. Smaller is closer
/// under both supported metrics.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub distance: f32,
}
