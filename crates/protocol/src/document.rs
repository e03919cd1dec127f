//! Schema-less documents and the typed views widgets read from them

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding a scalar document's text
pub const CONTENT_FIELD: &str = "content";
/// Field holding a collection document's entries
pub const ITEMS_FIELD: &str = "items";

/// A named, mutable, schema-less record in the store
pub type Document = serde_json::Map<String, Value>;

/// A document field did not have the shape its widget expects
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("field `{field}` has unexpected shape: {message}")]
    Shape { field: &'static str, message: String },
    #[error("could not encode field `{field}`: {message}")]
    Encode { field: &'static str, message: String },
}

/// `{ content: string }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarDocument {
    pub content: String,
}

impl ScalarDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Read the `content` field; a missing or null field reads as empty text
    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        match doc.get(CONTENT_FIELD) {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::String(s)) => Ok(Self::new(s.clone())),
            Some(other) => Err(DocumentError::Shape {
                field: CONTENT_FIELD,
                message: format!("expected string, got {other}"),
            }),
        }
    }

    /// Partial document for a merge write, touching only `content`
    pub fn into_fields(self) -> Document {
        let mut fields = Document::new();
        fields.insert(CONTENT_FIELD.to_string(), Value::String(self.content));
        fields
    }
}

/// `{ items: [Entry] }` in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDocument<E> {
    pub items: Vec<E>,
}

impl<E> Default for CollectionDocument<E> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<E: Serialize + DeserializeOwned> CollectionDocument<E> {
    pub const fn new(items: Vec<E>) -> Self {
        Self { items }
    }

    /// Read the `items` field; a missing or null field reads as empty
    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        match doc.get(ITEMS_FIELD) {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => serde_json::from_value(value.clone())
                .map(Self::new)
                .map_err(|e| DocumentError::Shape {
                    field: ITEMS_FIELD,
                    message: e.to_string(),
                }),
        }
    }

    /// Partial document for a merge write, touching only `items`
    pub fn into_fields(self) -> Result<Document, DocumentError> {
        let items = serde_json::to_value(self.items).map_err(|e| DocumentError::Encode {
            field: ITEMS_FIELD,
            message: e.to_string(),
        })?;
        let mut fields = Document::new();
        fields.insert(ITEMS_FIELD.to_string(), items);
        Ok(fields)
    }
}
