//! In-process vector store backend.
//!
//! Reference implementation of the store contract, including the
//! insertion-timestamp tie-break that networked backends can only
//! approximate. Used for local runs and tests.

use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{CollectionInfo, VectorStore};
use crate::error::VectorStoreError;
use crate::models::{DistanceMetric, ScoredRecord, VectorRecord, VectorStoreConfig};

pub struct MemoryBackend {
    collection: String,
    metric: DistanceMetric,
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl MemoryBackend {
    pub fn new(config: &VectorStoreConfig) -> Self {
        Self {
            collection: config.collection.clone(),
            metric: config.metric,
            records: RwLock::new(HashMap::new()),
        }
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            // Negated so that smaller distance means closer under both metrics
            DistanceMetric::InnerProduct => {
                -a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>()
            }
        }
    }
}

#[async_trait]
impl VectorStore for MemoryBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(true)
    }

    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let records = self.records.read().expect("store lock poisoned");
        Ok(Some(CollectionInfo {
            points_count: records.len() as u64,
        }))
    }

    async fn create_collection(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut state = self.records.write().expect("store lock poisoned");
        for mut record in records {
            record.inserted_at = Utc::now();
            state.insert(record.entity_id.clone(), record);
        }
        Ok(())
    }

    async fn fetch(&self, entity_id: &str) -> Result<Option<VectorRecord>, VectorStoreError> {
        let records = self.records.read().expect("store lock poisoned");
        Ok(records.get(entity_id).cloned())
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
        let records = self.records.read().expect("store lock poisoned");

        let mut scored: Vec<ScoredRecord> = records
            .values()
            .map(|record| ScoredRecord {
                distance: self.distance(&vector, &record.vector),
                record: record.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.record.inserted_at.cmp(&b.record.inserted_at))
        });
        scored.truncate(k);

        Ok(scored)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend(metric: DistanceMetric) -> MemoryBackend {
        MemoryBackend::new(&VectorStoreConfig {
            metric,
            ..Default::default()
        })
    }

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord::new(id, vector, json!({}))
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = backend(DistanceMetric::Euclidean);

        store.upsert(vec![record("e1", vec![1.0, 0.0])]).await.unwrap();
        let first = store.fetch("e1").await.unwrap().unwrap();

        store.upsert(vec![record("e1", vec![1.0, 0.0])]).await.unwrap();
        let second = store.fetch("e1").await.unwrap().unwrap();

        let info = store.get_collection_info().await.unwrap().unwrap();
        assert_eq!(info.points_count, 1);
        assert!(second.inserted_at >= first.inserted_at);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_vector() {
        let store = backend(DistanceMetric::Euclidean);

        store.upsert(vec![record("e1", vec![1.0, 0.0])]).await.unwrap();
        store.upsert(vec![record("e1", vec![0.0, 1.0])]).await.unwrap();

        let fetched = store.fetch("e1").await.unwrap().unwrap();
        assert_eq!(fetched.vector, vec![0.0, 1.0]);
        let info = store.get_collection_info().await.unwrap().unwrap();
        assert_eq!(info.points_count, 1);
    }

    #[tokio::test]
    async fn test_query_euclidean_ranking() {
        let store = backend(DistanceMetric::Euclidean);
        store
            .upsert(vec![
                record("far", vec![10.0, 0.0]),
                record("near", vec![1.0, 0.0]),
                record("mid", vec![3.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.query(vec![0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.entity_id, "near");
        assert_eq!(results[1].record.entity_id, "mid");
    }

    #[tokio::test]
    async fn test_query_inner_product_ranking() {
        let store = backend(DistanceMetric::InnerProduct);
        store
            .upsert(vec![
                record("weak", vec![0.1, 0.0]),
                record("strong", vec![5.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.query(vec![1.0, 0.0], 2).await.unwrap();
        assert_eq!(results[0].record.entity_id, "strong");
    }

    #[tokio::test]
    async fn test_query_ties_broken_by_insertion_time() {
        let store = backend(DistanceMetric::Euclidean);
        store.upsert(vec![record("older", vec![1.0, 1.0])]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.upsert(vec![record("newer", vec![1.0, 1.0])]).await.unwrap();

        let results = store.query(vec![0.0, 0.0], 2).await.unwrap();
        assert_eq!(results[0].record.entity_id, "older");
        assert_eq!(results[1].record.entity_id, "newer");
    }

    #[tokio::test]
    async fn test_fetch_missing_returns_none() {
        let store = backend(DistanceMetric::Euclidean);
        assert!(store.fetch("nope").await.unwrap().is_none());
    }
}
