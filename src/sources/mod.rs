//! Entity source implementations.
//!
//! Sources hand the pipeline entities that need vector representations.
//! Reads are paginated through an opaque cursor and idempotent: re-reading
//! a page yields the same entities, so an interrupted run can resume.

mod jsonl;

pub use jsonl::JsonlSource;

use crate::error::SourceError;
use crate::models::Entity;

/// One page of entities plus the cursor for the next page, if any.
#[derive(Debug, Clone)]
pub struct SourcePage {
    pub entities: Vec<Entity>,
    pub next_cursor: Option<String>,
}

/// Read-only, paginated view over entities awaiting embedding.
pub trait EntitySource: Send + Sync {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Fetch up to `limit` entities starting at `cursor` (None = start).
    fn fetch_page(&self, cursor: Option<&str>, limit: usize) -> Result<SourcePage, SourceError>;
}

/// Drain a source from the beginning, applying an optional total cap.
pub fn collect_entities(
    source: &dyn EntitySource,
    page_size: usize,
    limit: Option<usize>,
) -> Result<Vec<Entity>, SourceError> {
    let mut entities = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = source.fetch_page(cursor.as_deref(), page_size)?;
        entities.extend(page.entities);

        if let Some(limit) = limit
            && entities.len() >= limit
        {
            entities.truncate(limit);
            break;
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(entities)
}
