//! Widget test harness: one shared in-memory store, upload host, and telemetry recorder

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use syncnote_host::identity::{Claims, Identity, Role};
use syncnote_host::telemetry::RecordingSink;
use syncnote_host::{CollectionOptions, Services, SyncedCollection, SyncedScalar};
use syncnote_protocol::{ContentKind, Document, DocumentKey, FileRecord};
use syncnote_store::{DocumentStore, MemoryStore, MemoryUploads};

/// Fail the test instead of hanging when something never happens
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out waiting")
}

pub fn fields(value: serde_json::Value) -> Document {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub fn identity(id: &str, role: Role) -> Identity {
    Identity::new(claims(id), role)
}

pub fn claims(id: &str) -> Claims {
    Claims {
        id: id.to_string(),
        display_name: format!("User {id}"),
        email: format!("{id}@example.com"),
        avatar_url: Some(format!("https://avatars.example/{id}.png")),
    }
}

pub struct TestHarness {
    pub store: MemoryStore,
    pub uploads: Arc<MemoryUploads>,
    pub telemetry: Arc<RecordingSink>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            store,
            uploads: Arc::new(MemoryUploads::default()),
            telemetry: Arc::new(RecordingSink::new()),
        }
    }

    pub fn services(&self) -> Services {
        Services::new(
            Arc::new(self.store.clone()),
            self.uploads.clone(),
            self.telemetry.clone(),
        )
    }

    pub fn scalar(&self, id: &str, kind: ContentKind) -> SyncedScalar {
        self.scalar_on(Arc::new(self.store.clone()), id, kind)
    }

    /// Scalar widget talking to a wrapped store
    pub fn scalar_on(
        &self,
        store: Arc<dyn DocumentStore>,
        id: &str,
        kind: ContentKind,
    ) -> SyncedScalar {
        SyncedScalar::new(store, DocumentKey::new(id, kind).unwrap(), self.telemetry.clone())
    }

    pub fn media(&self, id: &str) -> SyncedCollection<String> {
        self.media_on(Arc::new(self.store.clone()), id)
    }

    pub fn media_on(&self, store: Arc<dyn DocumentStore>, id: &str) -> SyncedCollection<String> {
        SyncedCollection::new(
            store,
            self.uploads.clone(),
            DocumentKey::new(id, ContentKind::Media).unwrap(),
            CollectionOptions::media(),
            self.telemetry.clone(),
        )
    }

    pub fn files(&self, id: &str) -> SyncedCollection<FileRecord> {
        SyncedCollection::new(
            Arc::new(self.store.clone()),
            self.uploads.clone(),
            DocumentKey::new(id, ContentKind::Files).unwrap(),
            CollectionOptions::files(),
            self.telemetry.clone(),
        )
    }
}
