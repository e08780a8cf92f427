use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{OutputFormat, ScoredRecord};
use crate::services::job_log::{JobCounts, JobLogEntry};
use crate::services::orchestrator::RunSummary;

/// Infrastructure and job-queue status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding_driver: String,
    pub embedding_url: Option<String>,
    pub embedding_ready: bool,
    pub vector_store_driver: String,
    pub vector_store_url: String,
    pub vector_store_connected: bool,
    pub vector_store_points: u64,
    pub collection: String,
    pub job_counts: Option<JobCounts>,
}

/// Results of a similarity query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResults {
    pub query: String,
    pub results: Vec<ScoredRecord>,
    pub duration_ms: u64,
}

pub trait Formatter {
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_run_summary(&self, summary: &RunSummary) -> String;
    fn format_jobs(&self, jobs: &[JobLogEntry]) -> String;
    fn format_query_results(&self, results: &QueryResults) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let embedding_state = if status.embedding_ready {
            "[READY]"
        } else {
            "[UNAVAILABLE]"
        };
        writeln!(
            output,
            "Embedding:    {} ({})",
            embedding_state, status.embedding_driver
        )
        .unwrap();
        if let Some(ref url) = status.embedding_url {
            writeln!(output, "  URL:        {}", url).unwrap();
        }

        let store_state = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[UNREACHABLE]"
        };
        writeln!(
            output,
            "Vector store: {} ({})",
            store_state, status.vector_store_driver
        )
        .unwrap();
        writeln!(output, "  URL:        {}", status.vector_store_url).unwrap();
        writeln!(output, "  Collection: {}", status.collection).unwrap();
        writeln!(output, "  Records:    {}", status.vector_store_points).unwrap();

        if let Some(ref counts) = status.job_counts {
            writeln!(output, "Jobs:         {} total", counts.total()).unwrap();
            writeln!(output, "  Completed:  {}", counts.completed).unwrap();
            writeln!(output, "  Failed:     {}", counts.failed).unwrap();
            writeln!(output, "  Pending:    {}", counts.pending).unwrap();
        }

        output
    }

    fn format_run_summary(&self, summary: &RunSummary) -> String {
        let mut output = String::new();
        writeln!(output, "Run complete in {}ms", summary.duration_ms).unwrap();
        writeln!(output, "  Enqueued:   {}", summary.enqueued).unwrap();
        writeln!(output, "  Batches:    {}", summary.batches).unwrap();
        writeln!(output, "  Completed:  {}", summary.completed).unwrap();
        writeln!(output, "  Failed:     {}", summary.failed).unwrap();
        writeln!(output, "  Retries:    {}", summary.retries).unwrap();
        if summary.rejections > 0 {
            writeln!(output, "  Rejections: {}", summary.rejections).unwrap();
        }
        if summary.repeated_rejections > 0 {
            writeln!(
                output,
                "  Repeated rejections: {} (likely a persistent data or model issue)",
                summary.repeated_rejections
            )
            .unwrap();
        }
        output
    }

    fn format_jobs(&self, jobs: &[JobLogEntry]) -> String {
        if jobs.is_empty() {
            return "No job history found.\n".to_string();
        }

        let mut output = String::new();
        for job in jobs {
            writeln!(
                output,
                "{}  {}  {}  retries={}",
                job.recorded_at, job.entity_id, job.status, job.retries
            )
            .unwrap();
            if let Some(ref error) = job.error {
                writeln!(output, "    error: {}", error).unwrap();
            }
        }
        output
    }

    fn format_query_results(&self, results: &QueryResults) -> String {
        if results.results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "Query results for: \"{}\"", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, result) in results.results.iter().enumerate() {
            writeln!(
                output,
                "{}. [Distance: {:.4}] {}",
                i + 1,
                result.distance,
                result.record.entity_id
            )
            .unwrap();
            if let Some(kind) = result.record.metadata.get("entity_kind") {
                writeln!(output, "   Kind: {}", kind.as_str().unwrap_or("?")).unwrap();
            }
            writeln!(output, "   Inserted: {}", result.record.inserted_at.to_rfc3339()).unwrap();
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

pub struct JsonFormatter;

impl JsonFormatter {
    fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_status(&self, status: &StatusInfo) -> String {
        Self::to_json(status)
    }

    fn format_run_summary(&self, summary: &RunSummary) -> String {
        Self::to_json(summary)
    }

    fn format_jobs(&self, jobs: &[JobLogEntry]) -> String {
        Self::to_json(&jobs)
    }

    fn format_query_results(&self, results: &QueryResults) -> String {
        Self::to_json(results)
    }

    fn format_message(&self, message: &str) -> String {
        Self::to_json(&serde_json::json!({ "message": message }))
    }

    fn format_error(&self, error: &str) -> String {
        Self::to_json(&serde_json::json!({ "error": error }))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}
