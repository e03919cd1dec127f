//! JSON-file document store
//!
//! A [`MemoryStore`] whose documents are persisted to a single JSON file. The
//! file is rewritten (temp file + rename) before each write is published, so a
//! failed persist never reaches subscribers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use syncnote_protocol::{Document, DocumentPath};
use tokio::sync::Mutex;

use crate::backend::DocumentStore;
use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::merge::deep_merge;
use crate::subscription::Subscription;

/// Document store persisted to a local JSON file
pub struct JsonFileStore {
    memory: MemoryStore,
    file: PathBuf,
    /// Serializes writes so the file always reflects a prefix of the write order
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or lazily create) a store backed by `file`
    pub async fn open(file: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let file = file.into();
        let documents: BTreeMap<DocumentPath, Document> = match tokio::fs::read(&file).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::InvalidDocument {
                    path: file.display().to_string(),
                    message: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(file = %file.display(), documents = documents.len(), "opened document file");
        let memory = MemoryStore::with_documents(
            documents.iter().map(|(path, doc)| (path.as_str(), doc.clone())),
        );
        Ok(Self {
            memory,
            file,
            write_lock: Mutex::new(()),
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// The in-memory view (shares subscriptions with this store)
    pub const fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    async fn persist(&self, documents: &BTreeMap<DocumentPath, Document>) -> Result<(), StoreError> {
        if let Some(parent) = self.file.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(documents).map_err(|e| StoreError::Io(e.to_string()))?;
        let tmp = self.file.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.file).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        self.memory.get(path).await
    }

    async fn set_merge(&self, path: &DocumentPath, fields: Document) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut documents = self.memory.documents();
        deep_merge(documents.entry(path.clone()).or_default(), fields.clone());
        self.persist(&documents).await?;

        self.memory.set_merge(path, fields).await
    }

    fn subscribe(&self, path: &DocumentPath) -> Subscription {
        self.memory.subscribe(path)
    }
}
