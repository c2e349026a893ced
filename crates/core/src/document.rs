//! JSON document model with CouchDB reserved fields.
//!
//! A [`Document`] is an ordinary JSON object with two reserved fields:
//! `_id` (stable identity) and `_rev` (opaque revision token assigned by the
//! store on every successful write). A document that lacks `_rev` has not
//! been confirmed persisted; the distinction is structural, not nominal.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Reserved field holding the document's stable identity.
pub const ID_FIELD: &str = "_id";

/// Reserved field holding the store-assigned revision token.
pub const REV_FIELD: &str = "_rev";

/// A JSON document keyed by `_id` and versioned by `_rev`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// An empty document with no fields at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A document carrying only an `_id`.
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(ID_FIELD.to_string(), Value::String(id.into()));
        Self { fields }
    }

    /// Builder-style field insertion.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn rev(&self) -> Option<&str> {
        self.fields.get(REV_FIELD).and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.fields.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    pub fn set_rev(&mut self, rev: impl Into<String>) {
        self.fields.insert(REV_FIELD.to_string(), Value::String(rev.into()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// True iff the document carries both reserved fields, i.e. it reflects
    /// a state confirmed to exist remotely.
    pub fn is_stored(&self) -> bool {
        self.id().is_some() && self.rev().is_some()
    }

    /// Structural negation of [`Document::is_stored`]: a payload not yet
    /// confirmed persisted.
    pub fn is_pre_document(&self) -> bool {
        !self.is_stored()
    }

    /// A copy with the revision marker stripped. Used for snapshot hashing.
    pub fn without_rev(&self) -> Document {
        let mut copy = self.clone();
        copy.fields.remove(REV_FIELD);
        copy
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl TryFrom<Value> for Document {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::Parse(format!("document body is not a JSON object: {other}"))),
        }
    }
}

/// A caller-supplied document reference: a bare id, or a full (or partial)
/// document body.
#[derive(Debug, Clone)]
pub enum DocumentRef {
    Id(String),
    Doc(Document),
}

impl DocumentRef {
    /// The id carried by the reference, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            DocumentRef::Id(id) => Some(id),
            DocumentRef::Doc(doc) => doc.id(),
        }
    }
}

impl From<&str> for DocumentRef {
    fn from(id: &str) -> Self {
        DocumentRef::Id(id.to_string())
    }
}

impl From<String> for DocumentRef {
    fn from(id: String) -> Self {
        DocumentRef::Id(id)
    }
}

impl From<Document> for DocumentRef {
    fn from(doc: Document) -> Self {
        DocumentRef::Doc(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_id() {
        let doc = Document::with_id("a");
        assert_eq!(doc.id(), Some("a"));
        assert_eq!(doc.rev(), None);
    }

    #[test]
    fn test_stored_requires_both_reserved_fields() {
        let mut doc = Document::with_id("a");
        assert!(doc.is_pre_document());

        doc.set_rev("1-abc");
        assert!(doc.is_stored());
        assert!(!doc.is_pre_document());
    }

    #[test]
    fn test_empty_document_is_pre_document() {
        assert!(Document::new().is_pre_document());
    }

    #[test]
    fn test_without_rev() {
        let mut doc = Document::with_id("a").field("name", "foo");
        doc.set_rev("1-abc");

        let stripped = doc.without_rev();
        assert_eq!(stripped.rev(), None);
        assert_eq!(stripped.id(), Some("a"));
        assert_eq!(stripped.get("name"), Some(&Value::String("foo".to_string())));
        assert_eq!(doc.rev(), Some("1-abc"));
    }

    #[test]
    fn test_serde_transparent() {
        let doc: Document = serde_json::from_str(r#"{"_id":"a","_rev":"1-x","name":"foo"}"#).unwrap();
        assert_eq!(doc.id(), Some("a"));
        assert_eq!(doc.rev(), Some("1-x"));

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["name"], "foo");
    }

    #[test]
    fn test_try_from_non_object() {
        let result = Document::try_from(Value::String("nope".to_string()));
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_document_ref_id() {
        let by_id: DocumentRef = "a".into();
        assert_eq!(by_id.id(), Some("a"));

        let by_doc: DocumentRef = Document::with_id("b").into();
        assert_eq!(by_doc.id(), Some("b"));

        let no_id: DocumentRef = Document::new().into();
        assert_eq!(no_id.id(), None);
    }
}
