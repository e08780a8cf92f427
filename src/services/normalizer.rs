//! Entity text extraction and normalization.

use crate::error::ContentError;
use crate::models::Entity;
use crate::utils::collapse_whitespace;

/// Payload fields checked for embeddable text, in priority order. The
/// fixed order keeps extraction deterministic across runs.
pub const TEXT_FIELDS: [&str; 3] = ["text", "content", "body"];

/// Cleaned, embeddable representation of one entity. Ephemeral: consumed
/// by the batch embedder, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedContent {
    pub entity_id: String,
    pub text: String,
    /// Stable digest of the normalized text, carried into the stored
    /// record's metadata so re-embedding runs can detect unchanged content.
    pub checksum: String,
}

/// Extract and clean the text-bearing field of an entity.
///
/// Lower-cases, collapses internal whitespace, trims. Deterministic: the
/// same entity always yields the same normalized content. Entities with no
/// usable text never reach the embedder.
pub fn normalize(entity: &Entity) -> Result<NormalizedContent, ContentError> {
    let raw = extract_text(entity)?;
    let text = collapse_whitespace(raw);

    if text.is_empty() {
        return Err(ContentError::EmptyContent(entity.id.clone()));
    }

    let checksum = checksum(&text);
    Ok(NormalizedContent {
        entity_id: entity.id.clone(),
        text,
        checksum,
    })
}

fn extract_text(entity: &Entity) -> Result<&str, ContentError> {
    for field in TEXT_FIELDS {
        if let Some(value) = entity.payload.get(field)
            && let Some(text) = value.as_str()
        {
            return Ok(text);
        }
    }
    Err(ContentError::MissingTextField(entity.id.clone()))
}

fn checksum(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(text.as_bytes());
    hex::encode(&hash[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;
    use serde_json::json;

    fn entity(payload: serde_json::Value) -> Entity {
        Entity::new("e1", EntityKind::Document, payload)
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        let e = entity(json!({"id": "e1", "text": "  Hello   World  "}));
        let normalized = normalize(&e).unwrap();
        assert_eq!(normalized.text, "hello world");
        assert_eq!(normalized.entity_id, "e1");
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let e = entity(json!({"text": "Some\tContent\nHere"}));
        let a = normalize(&e).unwrap();
        let b = normalize(&e).unwrap();
        assert_eq!(a, b);
        assert!(!a.checksum.is_empty());
    }

    #[test]
    fn test_field_priority_order() {
        let e = entity(json!({"body": "from body", "content": "from content"}));
        assert_eq!(normalize(&e).unwrap().text, "from content");

        let e = entity(json!({"body": "from body", "text": "from text"}));
        assert_eq!(normalize(&e).unwrap().text, "from text");
    }

    #[test]
    fn test_empty_content_rejected() {
        let e = entity(json!({"text": "   \n\t  "}));
        assert!(matches!(
            normalize(&e),
            Err(ContentError::EmptyContent(id)) if id == "e1"
        ));
    }

    #[test]
    fn test_missing_text_field_rejected() {
        let e = entity(json!({"id": "e1", "weight": 42}));
        assert!(matches!(
            normalize(&e),
            Err(ContentError::MissingTextField(id)) if id == "e1"
        ));
    }

    #[test]
    fn test_non_string_text_field_skipped() {
        let e = entity(json!({"text": 42, "content": "fallback"}));
        assert_eq!(normalize(&e).unwrap().text, "fallback");
    }
}
