use async_trait::async_trait;
use syncnote_protocol::{Document, DocumentPath};

use crate::error::StoreError;
use crate::subscription::Subscription;

/// State of one document as delivered to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: DocumentPath,
    /// `None` when the document has never been written
    pub document: Option<Document>,
}

impl Snapshot {
    pub const fn exists(&self) -> bool {
        self.document.is_some()
    }
}

/// What a live subscription yields: a snapshot, or an error in its place
pub type SnapshotEvent = Result<Snapshot, StoreError>;

/// Document store trait - every widget read and write goes through this
///
/// Implementations must deliver each subscriber the states of one document in
/// a single global write order. Nothing is promised across documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the latest state of a document (`None` when absent)
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError>;

    /// Merge-write: overwrite only the given fields, creating the document if absent
    async fn set_merge(&self, path: &DocumentPath, fields: Document) -> Result<(), StoreError>;

    /// Open a live subscription
    ///
    /// The current state is delivered first, then every subsequent write.
    fn subscribe(&self, path: &DocumentPath) -> Subscription;

    // ─────────────────────────────────────────────────────────────────────────
    // Optional operations with default implementations
    // ─────────────────────────────────────────────────────────────────────────

    /// Check whether a document has been created
    async fn exists(&self, path: &DocumentPath) -> Result<bool, StoreError> {
        Ok(self.get(path).await?.is_some())
    }
}
