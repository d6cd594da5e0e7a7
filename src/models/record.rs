//! Stored records and their identity.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Deterministic identifier for a stored record.
///
/// A UUIDv5 of `"{namespace}:{key}"` under the DNS namespace UUID. Writing the
/// same `(namespace, key)` pair twice addresses the same point, which is what
/// makes `put` an overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Derives the identifier for a `(namespace, key)` pair.
    #[must_use]
    pub fn new(namespace: &str, key: &str) -> Self {
        let name = format!("{namespace}:{key}");
        Self(Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes()))
    }

    /// Parses an identifier returned by a storage engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the string is not a UUID.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("invalid record id '{s}': {e}")))
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field names owned by [`Payload`] itself; they cannot be used in `extra`.
pub const RESERVED_PAYLOAD_FIELDS: [&str; 2] = ["content", "embedding"];

/// Payload attached to a record.
///
/// `content` is the only mandatory field; anything else the caller supplies is
/// kept in `extra` and serialized beside it. An `embedding`, when present, is
/// used verbatim as the record's vector instead of embedding the payload text.
/// It is accepted on input but never written back out.
///
/// Extra fields named like [`RESERVED_PAYLOAD_FIELDS`] would not survive a
/// round trip, so [`Payload::to_json`] rejects them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Payload {
    /// Text content of the record.
    #[serde(default)]
    pub content: String,

    /// Open-ended caller fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// Precomputed vector for this record.
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
}

impl Payload {
    /// Creates a payload with the given content and no extra fields.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            extra: Map::new(),
            embedding: None,
        }
    }

    /// Adds an extra field. Reserved names make [`Payload::to_json`] fail.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Attaches a precomputed embedding.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Returns an extra field by name.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Serializes the payload to JSON, without the embedding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if an extra field uses a reserved
    /// name, or an error if an extra field cannot be serialized.
    pub fn to_json(&self) -> Result<Value> {
        if let Some(name) = RESERVED_PAYLOAD_FIELDS
            .iter()
            .find(|name| self.extra.contains_key(**name))
        {
            return Err(Error::InvalidInput(format!(
                "payload field '{name}' is reserved"
            )));
        }
        serde_json::to_value(self).map_err(|e| Error::OperationFailed {
            operation: "serialize_payload".to_string(),
            cause: e.to_string(),
        })
    }

    /// Deserializes a payload previously produced by [`Payload::to_json`].
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a JSON object.
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::OperationFailed {
            operation: "deserialize_payload".to_string(),
            cause: e.to_string(),
        })
    }
}

/// A `(key, payload, score)` triple returned by namespace search.
pub type ScoredRecord = (String, Payload, f32);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_is_deterministic() {
        assert_eq!(RecordId::new("menu", "k1"), RecordId::new("menu", "k1"));
        assert_ne!(RecordId::new("menu", "k1"), RecordId::new("branches", "k1"));
        assert_ne!(RecordId::new("menu", "k1"), RecordId::new("menu", "k2"));
    }

    #[test]
    fn test_record_id_matches_uuid5_of_joined_pair() {
        let expected = Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"menu:k1");
        assert_eq!(RecordId::new("menu", "k1").as_uuid(), &expected);
        assert_eq!(expected.get_version_num(), 5);
    }

    #[test]
    fn test_record_id_parse_round_trips_display() {
        let id = RecordId::new("a", "b");
        let parsed = RecordId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert!(RecordId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_payload_flattens_extra_fields() {
        let payload = Payload::new("red shoes")
            .with_field("price", 49)
            .with_field("tags", json!(["shoes"]));

        let value = payload.to_json().unwrap();
        assert_eq!(value["content"], "red shoes");
        assert_eq!(value["price"], 49);
        assert_eq!(value["tags"][0], "shoes");
    }

    #[test]
    fn test_payload_embedding_is_input_only() {
        let payload: Payload =
            serde_json::from_value(json!({"content": "x", "embedding": [0.5, 0.5]})).unwrap();
        assert_eq!(payload.embedding, Some(vec![0.5, 0.5]));
        assert!(payload.field("embedding").is_none());

        let value = payload.to_json().unwrap();
        assert!(value.get("embedding").is_none());
    }

    #[test]
    fn test_payload_rejects_reserved_extra_fields() {
        for name in RESERVED_PAYLOAD_FIELDS {
            let payload = Payload::new("x").with_field(name, json!([1.0, 2.0]));
            assert!(matches!(payload.to_json(), Err(Error::InvalidInput(_))));
        }
        assert!(Payload::new("x").with_field("title", "t").to_json().is_ok());
    }

    #[test]
    fn test_payload_missing_content_defaults_to_empty() {
        let payload = Payload::from_json(json!({"title": "t"})).unwrap();
        assert!(payload.content.is_empty());
        assert_eq!(payload.field("title"), Some(&json!("t")));
    }
}
