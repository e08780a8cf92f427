//! Job orchestration.
//!
//! Drives batch cycles over enqueued entities: normalize, embed, gate,
//! persist. Component failures never escape; each one becomes a status
//! transition on the job that hit it, and every job ends in `completed`
//! or `failed`.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::models::{EmbeddingJob, Entity, JobStatus, PipelineConfig, VectorRecord};
use crate::services::embedder::BatchEmbedder;
use crate::services::job_log::JobLog;
use crate::services::normalizer::{self, NormalizedContent};
use crate::services::quality::{GateRejection, QualityGate};
use crate::services::vector_store::VectorStore;
use crate::utils::retry::{Retryable, RetryConfig};

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub enqueued: u64,
    pub batches: u64,
    pub completed: u64,
    pub failed: u64,
    pub retries: u64,
    pub rejections: u64,
    /// Jobs rejected by the same quality rule on consecutive attempts.
    /// A climbing value points at a persistent data or model problem
    /// rather than transient noise.
    pub repeated_rejections: u64,
    pub duration_ms: u64,
}

struct Slot {
    job: EmbeddingJob,
    entity: Entity,
    next_attempt_at: Instant,
    last_rejection: Option<&'static str>,
}

#[derive(Default)]
struct Board {
    slots: HashMap<String, Slot>,
    queue: VecDeque<String>,
    live_entities: HashSet<String>,
}

/// Rolling centroid of accepted vectors; the coherence reference.
#[derive(Default)]
struct Centroid {
    sum: Vec<f32>,
    count: u64,
}

impl Centroid {
    fn reference(&self) -> Option<Vec<f32>> {
        if self.count == 0 {
            return None;
        }
        let count = self.count as f32;
        Some(self.sum.iter().map(|v| v / count).collect())
    }

    fn update(&mut self, vector: &[f32]) {
        if self.sum.len() != vector.len() {
            self.sum = vec![0.0; vector.len()];
            self.count = 0;
        }
        for (acc, v) in self.sum.iter_mut().zip(vector.iter()) {
            *acc += v;
        }
        self.count += 1;
    }
}

pub struct Orchestrator {
    pipeline: PipelineConfig,
    retry: RetryConfig,
    embedder: BatchEmbedder,
    gate: QualityGate,
    store: Arc<dyn VectorStore>,
    log: Option<Arc<JobLog>>,
    shutdown: Arc<AtomicBool>,
    board: Mutex<Board>,
    centroid: Mutex<Centroid>,
    summary: Mutex<RunSummary>,
}

impl Orchestrator {
    pub fn new(
        embedder: BatchEmbedder,
        gate: QualityGate,
        store: Arc<dyn VectorStore>,
        pipeline: PipelineConfig,
    ) -> Self {
        let retry = pipeline.retry_config();
        Self {
            pipeline,
            retry,
            embedder,
            gate,
            store,
            log: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            board: Mutex::new(Board::default()),
            centroid: Mutex::new(Centroid::default()),
            summary: Mutex::new(RunSummary::default()),
        }
    }

    /// Attach a job history log; every status transition gets recorded.
    #[must_use]
    pub fn with_job_log(mut self, log: Arc<JobLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Queue an entity for embedding.
    ///
    /// Returns false when the entity already has a live (non-terminal)
    /// job: at most one in-flight job per entity id. Entities whose
    /// previous job finished may be enqueued again; that is the
    /// re-embedding flow, and the upsert overwrites the stored record.
    pub fn enqueue(&self, entity: Entity) -> bool {
        let mut board = self.board.lock().expect("board lock poisoned");
        if board.live_entities.contains(&entity.id) {
            return false;
        }

        let job = EmbeddingJob::new(entity.id.clone(), entity.kind.clone());
        if let Some(ref log) = self.log {
            log.record(&job);
        }

        board.live_entities.insert(entity.id.clone());
        board.queue.push_back(job.id.clone());
        board.slots.insert(
            job.id.clone(),
            Slot {
                job,
                entity,
                next_attempt_at: Instant::now(),
                last_rejection: None,
            },
        );
        drop(board);

        self.summary.lock().expect("summary lock poisoned").enqueued += 1;
        true
    }

    /// Cooperative cancellation flag. Setting it lets the in-flight batch
    /// finish; no new batch starts afterwards.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// All jobs known to this orchestrator, oldest first.
    pub fn jobs(&self) -> Vec<EmbeddingJob> {
        let board = self.board.lock().expect("board lock poisoned");
        let mut jobs: Vec<EmbeddingJob> = board.slots.values().map(|s| s.job.clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    /// Latest job for an entity id, if any.
    pub fn job_for_entity(&self, entity_id: &str) -> Option<EmbeddingJob> {
        let board = self.board.lock().expect("board lock poisoned");
        board
            .slots
            .values()
            .filter(|s| s.job.entity_id == entity_id)
            .max_by(|a, b| a.job.created_at.cmp(&b.job.created_at))
            .map(|s| s.job.clone())
    }

    /// Number of jobs that reached a terminal status.
    pub fn terminal_count(&self) -> u64 {
        let board = self.board.lock().expect("board lock poisoned");
        board
            .slots
            .values()
            .filter(|s| s.job.status.is_terminal())
            .count() as u64
    }

    /// Drive batch cycles until every job is terminal or shutdown is
    /// requested. Jobs still `processing` at exit revert to `pending` so a
    /// restart retries them cleanly.
    pub async fn run(&self) -> RunSummary {
        let started = Instant::now();

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            let batch = self.take_batch();
            if batch.is_empty() {
                if !self.has_queued_jobs() {
                    break;
                }
                // Everything pending is in backoff; wait out the earliest
                // deadline, staying responsive to shutdown.
                self.wait_for_eligible().await;
                continue;
            }

            self.process_batch(batch).await;
            self.summary.lock().expect("summary lock poisoned").batches += 1;
        }

        self.revert_processing();

        let mut summary = self
            .summary
            .lock()
            .expect("summary lock poisoned")
            .clone();
        summary.duration_ms = started.elapsed().as_millis() as u64;
        summary
    }

    fn has_queued_jobs(&self) -> bool {
        let board = self.board.lock().expect("board lock poisoned");
        !board.queue.is_empty()
    }

    /// Pop eligible jobs FIFO up to the batch size, marking them
    /// `processing`. Jobs still inside their backoff window keep their
    /// queue position.
    fn take_batch(&self) -> Vec<(String, Entity)> {
        let mut board = self.board.lock().expect("board lock poisoned");
        let now = Instant::now();
        let batch_size = self.pipeline.batch_size as usize;

        let mut batch = Vec::new();
        let mut deferred = Vec::new();

        while batch.len() < batch_size {
            let Some(job_id) = board.queue.pop_front() else {
                break;
            };
            let Some(slot) = board.slots.get_mut(&job_id) else {
                continue;
            };
            if slot.next_attempt_at <= now {
                slot.job.status = JobStatus::Processing;
                slot.job.last_processed_at = Some(Utc::now().to_rfc3339());
                batch.push((job_id, slot.entity.clone()));
            } else {
                deferred.push(job_id);
            }
        }

        for job_id in deferred.into_iter().rev() {
            board.queue.push_front(job_id);
        }

        batch
    }

    async fn wait_for_eligible(&self) {
        let deadline = {
            let board = self.board.lock().expect("board lock poisoned");
            board
                .queue
                .iter()
                .filter_map(|id| board.slots.get(id))
                .map(|slot| slot.next_attempt_at)
                .min()
        };
        let Some(deadline) = deadline else {
            return;
        };

        while Instant::now() < deadline {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(50));
            tokio::time::sleep(remaining).await;
        }
    }

    async fn process_batch(&self, batch: Vec<(String, Entity)>) {
        // Normalize; bad content fails the job immediately
        let mut pending: Vec<(String, NormalizedContent)> = Vec::with_capacity(batch.len());
        for (job_id, entity) in batch {
            match normalizer::normalize(&entity) {
                Ok(normalized) => pending.push((job_id, normalized)),
                Err(err) => self.retry_or_fail(&job_id, err.to_string(), false),
            }
        }
        if pending.is_empty() {
            return;
        }

        // One embedding pass for the whole batch; order pairs results
        // back to jobs
        let texts: Vec<String> = pending.iter().map(|(_, n)| n.text.clone()).collect();
        let vectors = match self.embedder.embed_batch(&texts).await {
            Ok(vectors) => vectors,
            Err(err) => {
                let retryable = err.is_retryable();
                let detail = err.to_string();
                for (job_id, _) in &pending {
                    self.retry_or_fail(job_id, detail.clone(), retryable);
                }
                return;
            }
        };

        // Gate each vector against the rolling centroid
        let reference = self
            .centroid
            .lock()
            .expect("centroid lock poisoned")
            .reference();

        let mut accepted: Vec<(String, NormalizedContent, Vec<f32>, serde_json::Value)> =
            Vec::new();
        for ((job_id, normalized), vector) in pending.into_iter().zip(vectors.into_iter()) {
            match self.gate.evaluate(&vector, reference.as_deref()) {
                Ok(metrics) => {
                    let metrics =
                        serde_json::to_value(&metrics).unwrap_or(serde_json::Value::Null);
                    accepted.push((job_id, normalized, vector, metrics));
                }
                Err(rejection) => {
                    self.note_rejection(&job_id, &rejection);
                    self.retry_or_fail(&job_id, rejection.to_string(), true);
                }
            }
        }
        if accepted.is_empty() {
            return;
        }

        // Persist accepted vectors; ownership moves to the store
        let records: Vec<VectorRecord> = {
            let board = self.board.lock().expect("board lock poisoned");
            accepted
                .iter()
                .map(|(job_id, normalized, vector, metrics)| {
                    let kind = board
                        .slots
                        .get(job_id)
                        .map(|s| s.job.entity_kind.to_string())
                        .unwrap_or_default();
                    VectorRecord::new(
                        normalized.entity_id.clone(),
                        vector.clone(),
                        json!({
                            "entity_kind": kind,
                            "checksum": normalized.checksum,
                            "quality": metrics,
                        }),
                    )
                })
                .collect()
        };

        match self.store.upsert(records).await {
            Ok(()) => {
                let mut centroid = self.centroid.lock().expect("centroid lock poisoned");
                for (job_id, _, vector, _) in &accepted {
                    centroid.update(vector);
                    self.complete_job(job_id);
                }
            }
            Err(err) => {
                let retryable = err.is_retryable();
                let detail = err.to_string();
                for (job_id, _, _, _) in &accepted {
                    self.retry_or_fail(job_id, detail.clone(), retryable);
                }
            }
        }
    }

    /// Requeue with backoff, or mark failed once the error is not
    /// retryable or the retry budget is spent. The error detail lands on
    /// the job verbatim.
    fn retry_or_fail(&self, job_id: &str, detail: String, retryable: bool) {
        let mut board = self.board.lock().expect("board lock poisoned");
        let Some(slot) = board.slots.get_mut(job_id) else {
            return;
        };

        if retryable {
            slot.job.retries += 1;
            if slot.job.retries < self.pipeline.max_retries {
                slot.job.status = JobStatus::Pending;
                slot.job.error = None;
                slot.next_attempt_at =
                    Instant::now() + self.retry.delay_for_attempt(slot.job.retries + 1);
                let job = slot.job.clone();
                board.queue.push_back(job_id.to_string());
                drop(board);

                self.summary.lock().expect("summary lock poisoned").retries += 1;
                if let Some(ref log) = self.log {
                    log.record(&job);
                }
                return;
            }
        }

        slot.job.status = JobStatus::Failed;
        slot.job.error = Some(detail);
        let entity_id = slot.job.entity_id.clone();
        let job = slot.job.clone();
        board.live_entities.remove(&entity_id);
        drop(board);

        self.summary.lock().expect("summary lock poisoned").failed += 1;
        if let Some(ref log) = self.log {
            log.record(&job);
        }
    }

    fn complete_job(&self, job_id: &str) {
        let mut board = self.board.lock().expect("board lock poisoned");
        let Some(slot) = board.slots.get_mut(job_id) else {
            return;
        };
        slot.job.status = JobStatus::Completed;
        slot.job.error = None;
        let entity_id = slot.job.entity_id.clone();
        let job = slot.job.clone();
        board.live_entities.remove(&entity_id);
        drop(board);

        self.summary.lock().expect("summary lock poisoned").completed += 1;
        if let Some(ref log) = self.log {
            log.record(&job);
        }
    }

    fn note_rejection(&self, job_id: &str, rejection: &GateRejection) {
        let mut board = self.board.lock().expect("board lock poisoned");
        let repeated = board
            .slots
            .get_mut(job_id)
            .map(|slot| {
                let repeated = slot.last_rejection == Some(rejection.rule());
                slot.last_rejection = Some(rejection.rule());
                repeated
            })
            .unwrap_or(false);
        drop(board);

        let mut summary = self.summary.lock().expect("summary lock poisoned");
        summary.rejections += 1;
        if repeated {
            summary.repeated_rejections += 1;
        }
    }

    /// Jobs caught mid-flight by a cancellation go back to `pending`, so
    /// a restart picks them up with no partial state.
    fn revert_processing(&self) {
        let mut board = self.board.lock().expect("board lock poisoned");
        let mut reverted = Vec::new();
        for (job_id, slot) in board.slots.iter_mut() {
            if slot.job.status == JobStatus::Processing {
                slot.job.status = JobStatus::Pending;
                reverted.push((job_id.clone(), slot.job.clone()));
            }
        }
        for (job_id, _) in &reverted {
            board.queue.push_back(job_id.clone());
        }
        drop(board);

        if let Some(ref log) = self.log {
            for (_, job) in &reverted {
                log.record(job);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;
    use serde_json::json;

    #[test]
    fn test_centroid_reference() {
        let mut centroid = Centroid::default();
        assert!(centroid.reference().is_none());

        centroid.update(&[1.0, 0.0]);
        centroid.update(&[0.0, 1.0]);
        let reference = centroid.reference().unwrap();
        assert_eq!(reference, vec![0.5, 0.5]);
    }

    #[test]
    fn test_centroid_resets_on_dimension_change() {
        let mut centroid = Centroid::default();
        centroid.update(&[1.0, 1.0]);
        centroid.update(&[1.0, 2.0, 3.0]);
        assert_eq!(centroid.reference().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    fn entity(id: &str) -> Entity {
        Entity::new(id, EntityKind::Document, json!({"text": "hello"}))
    }

    fn test_orchestrator() -> Orchestrator {
        use crate::models::{EmbeddingConfig, QualityConfig, VectorStoreConfig};
        use crate::services::embedder::HashEmbeddingBackend;
        use crate::services::vector_store::MemoryBackend;

        let embedding = EmbeddingConfig {
            dimension: 16,
            ..Default::default()
        };
        let pipeline = PipelineConfig::default();
        let embedder = BatchEmbedder::new(
            Arc::new(HashEmbeddingBackend::new(16)),
            &embedding,
            &pipeline,
        );
        let gate = QualityGate::new(&QualityConfig::default());
        let store = Arc::new(MemoryBackend::new(&VectorStoreConfig::default()));
        Orchestrator::new(embedder, gate, store, pipeline)
    }

    #[test]
    fn test_enqueue_dedups_live_entities() {
        let orchestrator = test_orchestrator();
        assert!(orchestrator.enqueue(entity("e1")));
        assert!(!orchestrator.enqueue(entity("e1")));
        assert!(orchestrator.enqueue(entity("e2")));

        let jobs = orchestrator.jobs();
        assert_eq!(jobs.len(), 2);
    }

    #[tokio::test]
    async fn test_reembedding_allowed_after_terminal() {
        let orchestrator = test_orchestrator();
        assert!(orchestrator.enqueue(entity("e1")));
        orchestrator.run().await;
        assert_eq!(
            orchestrator.job_for_entity("e1").unwrap().status,
            JobStatus::Completed
        );
        // Previous job is terminal, so a new one is accepted
        assert!(orchestrator.enqueue(entity("e1")));
    }
}
