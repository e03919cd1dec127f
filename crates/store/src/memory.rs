//! In-memory document store
//!
//! Provides a fast, ephemeral store with live subscriptions. All documents are
//! lost when the last handle is dropped. Cloning shares the same documents, so
//! two clones behave like two sessions talking to one hosted database.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use syncnote_protocol::{Document, DocumentPath};
use tokio::sync::mpsc;

use crate::backend::{DocumentStore, Snapshot, SnapshotEvent};
use crate::error::StoreError;
use crate::merge::deep_merge;
use crate::subscription::{Subscription, Unsubscriber};

struct Listener {
    id: u64,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
}

#[derive(Default)]
struct Inner {
    documents: BTreeMap<DocumentPath, Document>,
    listeners: HashMap<DocumentPath, Vec<Listener>>,
    next_listener: u64,
    writes: u64,
}

impl Inner {
    fn snapshot(&self, path: &DocumentPath) -> Snapshot {
        Snapshot {
            path: path.clone(),
            document: self.documents.get(path).cloned(),
        }
    }

    /// Push an event to every listener on `path`, dropping closed ones
    fn broadcast(&mut self, path: &DocumentPath, event: &SnapshotEvent) {
        if let Some(listeners) = self.listeners.get_mut(path) {
            listeners.retain(|l| l.tx.send(event.clone()).is_ok());
            if listeners.is_empty() {
                self.listeners.remove(path);
            }
        }
    }

    fn remove_listener(&mut self, path: &DocumentPath, id: u64) {
        if let Some(listeners) = self.listeners.get_mut(path) {
            listeners.retain(|l| l.id != id);
            if listeners.is_empty() {
                self.listeners.remove(path);
            }
        }
    }
}

/// In-memory document store with live subscriptions
///
/// Thread-safe via an internal mutex that is never held across an await.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with initial documents
    pub fn with_documents<'a>(documents: impl IntoIterator<Item = (&'a str, Document)>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            for (path, doc) in documents {
                inner.documents.insert(DocumentPath::new(path), doc);
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of open subscriptions on a path
    pub fn subscriber_count(&self, path: &DocumentPath) -> usize {
        self.lock().listeners.get(path).map_or(0, Vec::len)
    }

    /// Total successful merge writes since creation
    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }

    /// Copy of every stored document
    pub fn documents(&self) -> BTreeMap<DocumentPath, Document> {
        self.lock().documents.clone()
    }

    /// Deliver an error to every subscriber of `path` in place of a snapshot
    ///
    /// Subscriptions stay open, the way a hosted store reports a transient
    /// permission or connectivity failure on a live query.
    pub fn inject_error(&self, path: &DocumentPath, error: StoreError) {
        self.lock().broadcast(path, &Err(error));
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        Ok(self.lock().documents.get(path).cloned())
    }

    async fn set_merge(&self, path: &DocumentPath, fields: Document) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let doc = inner.documents.entry(path.clone()).or_default();
        deep_merge(doc, fields);
        inner.writes += 1;

        let snapshot = Ok(inner.snapshot(path));
        inner.broadcast(path, &snapshot);
        tracing::debug!(path = %path, "merge write applied");
        Ok(())
    }

    fn subscribe(&self, path: &DocumentPath) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = inner.next_listener;
        inner.next_listener += 1;

        // Current state first, same as a hosted live query
        let _ = tx.send(Ok(inner.snapshot(path)));
        inner
            .listeners
            .entry(path.clone())
            .or_default()
            .push(Listener { id, tx });
        drop(inner);

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        let listener_path = path.clone();
        let unsubscriber = Unsubscriber::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove_listener(&listener_path, id);
            }
        });

        Subscription::new(path.clone(), rx, unsubscriber)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn fields(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_get_absent_document() {
        let store = MemoryStore::new();
        let path = DocumentPath::new("texts/u1-notes");
        assert_eq!(store.get(&path).await.unwrap(), None);
        assert!(!store.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_merge_upserts() {
        let store = MemoryStore::new();
        let path = DocumentPath::new("texts/u1-notes");

        store.set_merge(&path, fields(json!({ "content": "hi" }))).await.unwrap();
        store.set_merge(&path, fields(json!({ "pinned": true }))).await.unwrap();

        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(Value::Object(doc), json!({ "content": "hi", "pinned": true }));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_delivers_current_then_writes() {
        let store = MemoryStore::new();
        let path = DocumentPath::new("media/u1-media");
        let mut sub = store.subscribe(&path);

        let first = sub.next_event().await.unwrap().unwrap();
        assert!(!first.exists());

        store.set_merge(&path, fields(json!({ "items": ["a"] }))).await.unwrap();
        let second = sub.next_event().await.unwrap().unwrap();
        assert_eq!(second.document.unwrap()["items"], json!(["a"]));
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_listener() {
        let store = MemoryStore::new();
        let path = DocumentPath::new("texts/u1-notes");
        let sub = store.subscribe(&path);
        let other = store.subscribe(&path);
        assert_eq!(store.subscriber_count(&path), 2);

        sub.unsubscribe();
        assert_eq!(store.subscriber_count(&path), 1);

        drop(other);
        assert_eq!(store.subscriber_count(&path), 0);
    }

    #[tokio::test]
    async fn test_injected_error_keeps_subscription_open() {
        let store = MemoryStore::new();
        let path = DocumentPath::new("texts/u1-notes");
        let mut sub = store.subscribe(&path);
        let _initial = sub.next_event().await;

        store.inject_error(&path, StoreError::PermissionDenied("rules".into()));
        assert!(sub.next_event().await.unwrap().is_err());

        store.set_merge(&path, fields(json!({ "content": "x" }))).await.unwrap();
        assert!(sub.next_event().await.unwrap().unwrap().exists());
    }

    #[tokio::test]
    async fn test_clones_share_documents() {
        let a = MemoryStore::new();
        let b = a.clone();
        let path = DocumentPath::new("texts/shared");
        a.set_merge(&path, fields(json!({ "content": "x" }))).await.unwrap();
        assert!(b.get(&path).await.unwrap().is_some());
    }
}
