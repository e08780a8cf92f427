//! Append-only sqlite history of embedding jobs.
//!
//! Each state the orchestrator records lands as a new row; rows are never
//! updated or deleted, so a job's trajectory through enqueue, requeue, and
//! terminal status stays queryable per entity id after the process exits.

use rusqlite::{Connection, params};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

use crate::models::{EmbeddingJob, JobStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS job_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    entity_kind TEXT NOT NULL,
    status TEXT NOT NULL,
    retries INTEGER NOT NULL,
    error TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_job_history_entity ON job_history(entity_id);
CREATE INDEX IF NOT EXISTS idx_job_history_status ON job_history(status);
"#;

/// One recorded transition.
#[derive(Debug, Clone, Serialize)]
pub struct JobLogEntry {
    pub job_id: String,
    pub entity_id: String,
    pub entity_kind: String,
    pub status: JobStatus,
    pub retries: u32,
    pub error: Option<String>,
    pub recorded_at: String,
}

/// Latest status counts across entities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl JobCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}

pub struct JobLog {
    conn: Mutex<Connection>,
}

impl JobLog {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append a job's current state. Logging must never fail the pipeline,
    /// so write errors are swallowed.
    pub fn record(&self, job: &EmbeddingJob) {
        let conn = self.conn.lock().expect("job log lock poisoned");
        let _ = conn.execute(
            "INSERT INTO job_history (job_id, entity_id, entity_kind, status, retries, error, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))",
            params![
                job.id,
                job.entity_id,
                job.entity_kind.to_string(),
                job.status.to_string(),
                job.retries,
                job.error,
            ],
        );
    }

    /// Most recent transition recorded for an entity.
    pub fn latest_for_entity(&self, entity_id: &str) -> Option<JobLogEntry> {
        let conn = self.conn.lock().expect("job log lock poisoned");
        conn.query_row(
            "SELECT job_id, entity_id, entity_kind, status, retries, error, recorded_at
             FROM job_history WHERE entity_id = ?1 ORDER BY id DESC LIMIT 1",
            params![entity_id],
            row_to_entry,
        )
        .ok()
    }

    /// Full recorded trajectory for an entity, oldest first.
    pub fn history_for_entity(&self, entity_id: &str) -> Vec<JobLogEntry> {
        let conn = self.conn.lock().expect("job log lock poisoned");
        let mut stmt = match conn.prepare(
            "SELECT job_id, entity_id, entity_kind, status, retries, error, recorded_at
             FROM job_history WHERE entity_id = ?1 ORDER BY id ASC",
        ) {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        stmt.query_map(params![entity_id], row_to_entry)
            .map(|rows| rows.filter_map(Result::ok).collect())
            .unwrap_or_default()
    }

    /// Latest state per entity, newest first, optionally filtered by
    /// status.
    pub fn latest_jobs(&self, limit: u32, status: Option<JobStatus>) -> Vec<JobLogEntry> {
        let conn = self.conn.lock().expect("job log lock poisoned");
        let query = "SELECT job_id, entity_id, entity_kind, status, retries, error, recorded_at
             FROM job_history
             WHERE id IN (SELECT MAX(id) FROM job_history GROUP BY entity_id)
               AND (?1 IS NULL OR status = ?1)
             ORDER BY id DESC LIMIT ?2";
        let mut stmt = match conn.prepare(query) {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        let status = status.map(|s| s.to_string());
        stmt.query_map(params![status, limit], row_to_entry)
            .map(|rows| rows.filter_map(Result::ok).collect())
            .unwrap_or_default()
    }

    /// Count entities by their latest recorded status.
    pub fn counts(&self) -> JobCounts {
        let conn = self.conn.lock().expect("job log lock poisoned");
        let mut counts = JobCounts::default();
        let mut stmt = match conn.prepare(
            "SELECT status, COUNT(*) FROM job_history
             WHERE id IN (SELECT MAX(id) FROM job_history GROUP BY entity_id)
             GROUP BY status",
        ) {
            Ok(stmt) => stmt,
            Err(_) => return counts,
        };
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        });
        if let Ok(rows) = rows {
            for (status, count) in rows.filter_map(Result::ok) {
                match status.parse() {
                    Ok(JobStatus::Pending) => counts.pending = count,
                    Ok(JobStatus::Processing) => counts.processing = count,
                    Ok(JobStatus::Completed) => counts.completed = count,
                    Ok(JobStatus::Failed) => counts.failed = count,
                    Err(_) => {}
                }
            }
        }
        counts
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobLogEntry> {
    let status: String = row.get(3)?;
    Ok(JobLogEntry {
        job_id: row.get(0)?,
        entity_id: row.get(1)?,
        entity_kind: row.get(2)?,
        status: status.parse().unwrap_or(JobStatus::Pending),
        retries: row.get(4)?,
        error: row.get(5)?,
        recorded_at: row.get(6)?,
    })
}
