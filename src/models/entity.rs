//! Source entities awaiting vectorization.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Kind of source entity.
///
/// Known kinds have dedicated variants; arbitrary kinds are supported via
/// `Other(String)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum EntityKind {
    #[default]
    Document,
    Node,
    Pattern,
    Other(String),
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Document => write!(f, "document"),
            EntityKind::Node => write!(f, "node"),
            EntityKind::Pattern => write!(f, "pattern"),
            EntityKind::Other(s) => write!(f, "{}", s),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "document" => EntityKind::Document,
            "node" => EntityKind::Node,
            "pattern" => EntityKind::Pattern,
            other => EntityKind::Other(other.to_string()),
        })
    }
}

impl Serialize for EntityKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap())
    }
}

/// One source record awaiting a vector representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    /// Raw structured payload; the normalizer extracts the text-bearing
    /// field from here.
    pub payload: serde_json::Value,
}

impl Entity {
    pub fn new(id: impl Into<String>, kind: EntityKind, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
        }
    }

    /// Derive a stable identifier from raw content for records that carry
    /// no id of their own.
    pub fn generate_id(raw: &str) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(raw.as_bytes());
        hex::encode(&hash[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_roundtrip() {
        let kind: EntityKind = "pattern".parse().unwrap();
        assert_eq!(kind, EntityKind::Pattern);
        assert_eq!(kind.to_string(), "pattern");

        let other: EntityKind = "telemetry".parse().unwrap();
        assert_eq!(other, EntityKind::Other("telemetry".to_string()));
        assert_eq!(other.to_string(), "telemetry");
    }

    #[test]
    fn test_generate_id_deterministic() {
        let a = Entity::generate_id("same content");
        let b = Entity::generate_id("same content");
        let c = Entity::generate_id("different content");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }
}
