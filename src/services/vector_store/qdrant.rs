//! Qdrant vector store backend implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder, VectorsOutput, vectors_output,
};
use std::collections::HashMap;
use uuid::Uuid;

use super::{CollectionInfo, VectorStore};
use crate::error::VectorStoreError;
use crate::models::{DistanceMetric, ScoredRecord, VectorRecord, VectorStoreConfig};

/// Qdrant vector store backend.
///
/// Point ids are UUIDv5 digests of the entity id, so upserting the same
/// entity always lands on the same point and overwrites it. Qdrant ranks
/// ties server-side without a secondary sort; the insertion-timestamp
/// tie-break is only approximated here (see the memory backend for the
/// exact contract).
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    dimension: u64,
    metric: DistanceMetric,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig, dimension: u64) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimension,
            metric: config.metric,
        })
    }

    fn point_id(entity_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, entity_id.as_bytes()).to_string()
    }

    fn qdrant_distance(&self) -> Distance {
        match self.metric {
            DistanceMetric::Euclidean => Distance::Euclid,
            DistanceMetric::InnerProduct => Distance::Dot,
        }
    }

    /// Convert a Qdrant score into a smaller-is-closer distance.
    fn score_to_distance(&self, score: f32) -> f32 {
        match self.metric {
            DistanceMetric::Euclidean => score,
            DistanceMetric::InnerProduct => -score,
        }
    }

    fn payload_str(
        payload: &HashMap<String, qdrant_client::qdrant::Value>,
        key: &str,
    ) -> Option<String> {
        payload.get(key).and_then(|v| match &v.kind {
            Some(qdrant_client::qdrant::value::Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        })
    }

    fn record_from_parts(
        payload: HashMap<String, qdrant_client::qdrant::Value>,
        vectors: Option<VectorsOutput>,
    ) -> VectorRecord {
        let entity_id = Self::payload_str(&payload, "entity_id").unwrap_or_default();
        let metadata = Self::payload_str(&payload, "metadata")
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or(serde_json::Value::Null);
        let inserted_at = Self::payload_str(&payload, "inserted_at")
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let vector = match vectors.and_then(|v| v.vectors_options) {
            Some(vectors_output::VectorsOptions::Vector(v)) => v.data,
            _ => Vec::new(),
        };

        VectorRecord {
            entity_id,
            vector,
            metadata,
            inserted_at,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        match self.client.collection_info(&self.collection).await {
            Ok(info) => Ok(Some(CollectionInfo {
                points_count: info.result.map_or(0, |r| r.points_count.unwrap_or(0)),
            })),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("doesn't exist") {
                    Ok(None)
                } else {
                    Err(VectorStoreError::CollectionError(msg))
                }
            }
        }
    }

    async fn create_collection(&self) -> Result<(), VectorStoreError> {
        if self.get_collection_info().await?.is_some() {
            return Ok(());
        }

        let create_collection = CreateCollectionBuilder::new(&self.collection).vectors_config(
            VectorParamsBuilder::new(self.dimension, self.qdrant_distance()),
        );

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|record| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert("entity_id".to_string(), record.entity_id.clone().into());
                payload.insert("metadata".to_string(), record.metadata.to_string().into());
                payload.insert(
                    "inserted_at".to_string(),
                    Utc::now().to_rfc3339().into(),
                );

                PointStruct::new(
                    Self::point_id(&record.entity_id),
                    record.vector,
                    payload,
                )
            })
            .collect();

        let upsert = UpsertPointsBuilder::new(&self.collection, points);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        Ok(())
    }

    async fn fetch(&self, entity_id: &str) -> Result<Option<VectorRecord>, VectorStoreError> {
        let filter = Filter::must([Condition::matches("entity_id", entity_id.to_string())]);
        let scroll = ScrollPointsBuilder::new(&self.collection)
            .filter(filter)
            .limit(1)
            .with_payload(true)
            .with_vectors(true);

        let response = self
            .client
            .scroll(scroll)
            .await
            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .next()
            .map(|point| Self::record_from_parts(point.payload, point.vectors)))
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
        let search = SearchPointsBuilder::new(&self.collection, vector, k as u64)
            .with_payload(true)
            .with_vectors(true);

        let results = self
            .client
            .search_points(search)
            .await
            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| ScoredRecord {
                distance: self.score_to_distance(point.score),
                record: Self::record_from_parts(point.payload, point.vectors),
            })
            .collect())
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
