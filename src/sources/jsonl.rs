//! JSONL entity source.
//!
//! Reads entities from a `.jsonl` file, or from every `.jsonl` file under
//! a directory. Files are visited in sorted order and the cursor is a
//! global record offset, which keeps page reads idempotent.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{EntitySource, SourcePage};
use crate::error::SourceError;
use crate::models::{Entity, EntityKind};

pub struct JsonlSource {
    files: Vec<PathBuf>,
}

impl JsonlSource {
    pub fn new(path: &Path) -> Result<Self, SourceError> {
        let mut files = Vec::new();

        if path.is_file() {
            files.push(path.to_path_buf());
        } else if path.is_dir() {
            for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
                let entry_path = entry.path();
                if entry_path.is_file()
                    && entry_path.extension().and_then(|e| e.to_str()) == Some("jsonl")
                {
                    files.push(entry_path.to_path_buf());
                }
            }
            files.sort();
        } else {
            return Err(SourceError::ParseError(format!(
                "path does not exist: {}",
                path.display()
            )));
        }

        if files.is_empty() {
            return Err(SourceError::NoEntities);
        }

        Ok(Self { files })
    }

    fn parse_line(line: &str) -> Result<Entity, SourceError> {
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| SourceError::ParseError(format!("invalid JSON record: {}", e)))?;

        if !value.is_object() {
            return Err(SourceError::ParseError(
                "record is not a JSON object".to_string(),
            ));
        }

        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| Entity::generate_id(line));

        let kind: EntityKind = value
            .get("kind")
            .and_then(|v| v.as_str())
            .map(|s| s.parse().unwrap_or_default())
            .unwrap_or_default();

        Ok(Entity::new(id, kind, value))
    }
}

impl EntitySource for JsonlSource {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn fetch_page(&self, cursor: Option<&str>, limit: usize) -> Result<SourcePage, SourceError> {
        let offset: usize = match cursor {
            Some(raw) => raw
                .parse()
                .map_err(|_| SourceError::InvalidCursor(raw.to_string()))?,
            None => 0,
        };

        let mut entities = Vec::new();
        let mut seen = 0usize;
        let mut more = false;

        'files: for file in &self.files {
            let content = std::fs::read_to_string(file)?;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if seen < offset {
                    seen += 1;
                    continue;
                }
                if entities.len() == limit {
                    more = true;
                    break 'files;
                }
                entities.push(Self::parse_line(line)?);
                seen += 1;
            }
        }

        let next_cursor = more.then(|| seen.to_string());
        Ok(SourcePage {
            entities,
            next_cursor,
        })
    }
}
