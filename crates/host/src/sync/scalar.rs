//! Synchronized scalar document (`{ content }`)

use std::fmt;
use std::sync::Arc;

use syncnote_protocol::{DocumentKey, DocumentPath, ScalarDocument};
use syncnote_store::{DocumentStore, SnapshotEvent};
use tokio::sync::watch;

use super::{Mirror, SyncView};
use crate::error::{LoadError, SaveError, WidgetError};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Save,
    Retry,
    Clear,
}

impl WriteKind {
    const fn save_method(self) -> &'static str {
        match self {
            Self::Save => "manual",
            Self::Retry => "retry",
            Self::Clear => "clear",
        }
    }
}

/// One text document mirrored into a local buffer
///
/// Cloning yields another handle to the same widget.
#[derive(Clone)]
pub struct SyncedScalar {
    store: Arc<dyn DocumentStore>,
    key: DocumentKey,
    path: DocumentPath,
    mirror: Arc<Mirror<String>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl SyncedScalar {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        key: DocumentKey,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            store,
            path: key.path(),
            key,
            mirror: Mirror::new(String::new()),
            telemetry,
        }
    }

    pub const fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub const fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// Subscribe to the document. A second call on an attached widget is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(&self) -> Result<(), WidgetError> {
        if self.mirror.is_detached() {
            return Err(WidgetError::Detached);
        }
        if self.mirror.is_bound() {
            return Ok(());
        }
        let subscription = self.store.subscribe(&self.path);
        let path = self.path.clone();
        self.mirror
            .bind(subscription, move |mirror, event| apply_event(&path, mirror, event));
        tracing::debug!(path = %self.path, "scalar attached");
        Ok(())
    }

    /// Release the subscription; the buffer is frozen from here on
    pub fn detach(&self) {
        if self.mirror.detach() {
            tracing::debug!(path = %self.path, "scalar detached");
        }
    }

    /// Replace the local buffer. Never touches the store.
    pub fn edit(&self, text: impl Into<String>) {
        let text = text.into();
        self.mirror.update(|view| view.buffer = text);
    }

    /// Merge-write the buffer as it is right now
    pub async fn save(&self) -> Result<(), WidgetError> {
        self.write(WriteKind::Save).await
    }

    /// Re-run a failed save; saving is idempotent
    pub async fn retry(&self) -> Result<(), WidgetError> {
        self.write(WriteKind::Retry).await
    }

    /// Empty the buffer and save; on success the buffer ends empty even if
    /// it was edited while the write was in flight
    pub async fn clear(&self) -> Result<(), WidgetError> {
        self.write(WriteKind::Clear).await
    }

    async fn write(&self, kind: WriteKind) -> Result<(), WidgetError> {
        let content = self.mirror.begin_op(true, |view| {
            if kind == WriteKind::Clear {
                view.buffer.clear();
            }
            view.buffer.clone()
        })?;
        let text_length = content.chars().count();

        let result = self
            .store
            .set_merge(&self.path, ScalarDocument::new(content).into_fields())
            .await;

        match result {
            Ok(()) => {
                self.mirror.end_op(true, None, |view, held| {
                    let latest = held.take();
                    if kind == WriteKind::Clear {
                        view.buffer.clear();
                    } else if let Some(content) = latest {
                        view.buffer = content;
                    }
                });
                tracing::debug!(path = %self.path, text_length, "saved");
                self.telemetry.emit(match kind {
                    WriteKind::Clear => TelemetryEvent::new("quick_note_cleared")
                        .with("document_id", self.key.as_str()),
                    WriteKind::Save | WriteKind::Retry => TelemetryEvent::new("text_saved")
                        .with("document_id", self.key.as_str())
                        .with("text_length", text_length)
                        .with("save_method", kind.save_method()),
                });
                Ok(())
            }
            Err(e) => {
                let error = WidgetError::from(SaveError::Store(e));
                tracing::warn!(path = %self.path, error = %error, "save failed");
                // Keep the unsaved text for a retry; the next snapshot resyncs
                self.mirror.end_op(true, Some(error.clone()), |_, held| {
                    held.take();
                });
                self.telemetry.emit(
                    TelemetryEvent::new("text_save_failed")
                        .with("document_id", self.key.as_str())
                        .with("save_method", kind.save_method())
                        .with("error", error.to_string()),
                );
                Err(error)
            }
        }
    }

    pub fn buffer(&self) -> String {
        self.mirror.buffer()
    }

    pub fn view(&self) -> SyncView<String> {
        self.mirror.view()
    }

    pub fn watch(&self) -> watch::Receiver<SyncView<String>> {
        self.mirror.watch()
    }

    pub fn is_detached(&self) -> bool {
        self.mirror.is_detached()
    }

    /// Wait until the view satisfies `pred`
    pub async fn wait_for(&self, pred: impl FnMut(&SyncView<String>) -> bool) -> SyncView<String> {
        self.mirror.wait_for(pred).await
    }
}

impl fmt::Debug for SyncedScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedScalar")
            .field("path", &self.path)
            .field("view", &self.view())
            .finish_non_exhaustive()
    }
}

fn apply_event(path: &DocumentPath, mirror: &Mirror<String>, event: SnapshotEvent) {
    let remote = event.map_err(LoadError::from).and_then(|snapshot| {
        snapshot
            .document
            .as_ref()
            .map(ScalarDocument::from_document)
            .transpose()
            .map_err(LoadError::from)
    });
    match remote {
        Ok(doc) => mirror.apply_remote(doc.map(|d| d.content), true),
        Err(error) => {
            tracing::warn!(path = %path, error = %error, "scalar load failed");
            mirror.apply_load_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use syncnote_protocol::{ContentKind, Document};
    use syncnote_store::{MemoryStore, StoreError};

    use super::*;
    use crate::sync::Phase;
    use crate::telemetry::RecordingSink;

    fn fields(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn widget(store: &MemoryStore, sink: &Arc<RecordingSink>) -> SyncedScalar {
        SyncedScalar::new(
            Arc::new(store.clone()),
            DocumentKey::new("u1", ContentKind::Texts).unwrap(),
            sink.clone(),
        )
    }

    async fn synced(widget: &SyncedScalar) -> SyncView<String> {
        tokio::time::timeout(Duration::from_secs(1), widget.wait_for(|v| v.snapshots > 0))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_attach_to_absent_document() {
        let store = MemoryStore::new();
        let sink = Arc::new(RecordingSink::new());
        let notes = widget(&store, &sink);
        assert_eq!(notes.view().phase, Phase::Unattached);

        notes.attach().unwrap();
        let view = synced(&notes).await;
        assert_eq!(view.phase, Phase::Synced);
        assert_eq!(view.buffer, "");
    }

    #[tokio::test]
    async fn test_edit_is_local_only() {
        let store = MemoryStore::new();
        let sink = Arc::new(RecordingSink::new());
        let notes = widget(&store, &sink);

        notes.edit("a");
        notes.edit("ab");
        assert_eq!(notes.buffer(), "ab");
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_save_writes_content_and_reports() {
        let store = MemoryStore::new();
        let sink = Arc::new(RecordingSink::new());
        let notes = widget(&store, &sink);
        notes.attach().unwrap();
        synced(&notes).await;

        notes.edit("hello");
        notes.save().await.unwrap();

        let doc = store.get(notes.path()).await.unwrap().unwrap();
        assert_eq!(doc["content"], json!("hello"));
        let event = sink.last("text_saved").unwrap();
        assert_eq!(event.param("text_length"), Some(&json!(5)));
        assert_eq!(event.param("document_id"), Some(&json!("u1-notes")));
    }

    #[tokio::test]
    async fn test_remote_snapshot_replaces_buffer() {
        let store = MemoryStore::new();
        let sink = Arc::new(RecordingSink::new());
        let notes = widget(&store, &sink);
        notes.attach().unwrap();
        synced(&notes).await;

        store
            .set_merge(notes.path(), fields(json!({ "content": "from elsewhere" })))
            .await
            .unwrap();
        let view = notes.wait_for(|v| v.buffer == "from elsewhere").await;
        assert_eq!(view.snapshots, 2);
    }

    #[tokio::test]
    async fn test_subscription_error_keeps_widget_usable() {
        let store = MemoryStore::new();
        let sink = Arc::new(RecordingSink::new());
        let notes = widget(&store, &sink);
        notes.attach().unwrap();
        synced(&notes).await;

        store.inject_error(notes.path(), StoreError::PermissionDenied("rules".into()));
        let view = notes.wait_for(|v| v.error.is_some()).await;
        assert_eq!(view.phase, Phase::Errored);
        assert!(view.can_retry());
        assert!(view.error_message().unwrap().starts_with("Error loading document"));

        notes.edit("still works");
        notes.save().await.unwrap();
        let view = notes.wait_for(|v| v.error.is_none()).await;
        assert_eq!(view.buffer, "still works");
    }

    #[tokio::test]
    async fn test_wrong_shape_is_a_load_error() {
        let store = MemoryStore::new();
        let sink = Arc::new(RecordingSink::new());
        let notes = widget(&store, &sink);
        store
            .set_merge(notes.path(), fields(json!({ "content": 42 })))
            .await
            .unwrap();

        notes.attach().unwrap();
        let view = notes.wait_for(|v| v.error.is_some()).await;
        assert!(matches!(view.error, Some(WidgetError::Load(LoadError::Shape(_)))));
    }

    #[tokio::test]
    async fn test_attach_twice_keeps_one_subscription() {
        let store = MemoryStore::new();
        let sink = Arc::new(RecordingSink::new());
        let notes = widget(&store, &sink);
        notes.attach().unwrap();
        notes.attach().unwrap();
        assert_eq!(store.subscriber_count(notes.path()), 1);

        notes.detach();
        assert_eq!(store.subscriber_count(notes.path()), 0);
        assert_eq!(notes.attach(), Err(WidgetError::Detached));
    }

    #[tokio::test]
    async fn test_clear_empties_and_reports() {
        let store = MemoryStore::new();
        let sink = Arc::new(RecordingSink::new());
        let quick = SyncedScalar::new(
            Arc::new(store.clone()),
            DocumentKey::new("u1", ContentKind::QuickNotes).unwrap(),
            sink.clone(),
        );
        quick.edit("scratch");
        quick.save().await.unwrap();

        quick.clear().await.unwrap();
        assert_eq!(quick.buffer(), "");
        let doc = store.get(quick.path()).await.unwrap().unwrap();
        assert_eq!(doc["content"], json!(""));
        assert_eq!(sink.names(), ["text_saved", "quick_note_cleared"]);
    }
}
