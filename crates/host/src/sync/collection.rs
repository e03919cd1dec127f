//! Synchronized append-only collection (`{ items: [...] }`)
//!
//! Appends are a fresh read followed by a merge write of the whole list. That
//! read-modify-write is not atomic: two appends that read the same state can
//! lose one entry. An atomic array-append or a version token on the document
//! would close the gap; neither is done here.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use syncnote_protocol::{
    CollectionDocument, CollectionEntry, ContentKind, DocumentKey, DocumentPath, FileRecord,
};
use syncnote_store::{
    DocumentStore, SnapshotEvent, UploadConstraints, UploadError, UploadFile, UploadService,
    UploadedFile,
};
use tokio::sync::watch;

use super::{Mirror, SyncView};
use crate::error::{DeleteFailure, LoadError, PartialDeleteError, SaveError, WidgetError};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

static VERSIONED_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/v\d+/(.+)\.[^./]+$").expect("versioned path regex"));

/// Derive the upload service's external id from a hosted URL
///
/// The id is everything between the `/v<digits>/` version marker and the
/// final extension: `.../upload/v1700/syncnote/cat_ab12.png` -> `syncnote/cat_ab12`.
pub fn external_id(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    VERSIONED_PATH
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Entry built from a finished upload
pub trait FromUpload: CollectionEntry {
    fn from_upload(uploaded: &UploadedFile) -> Self;
}

impl FromUpload for String {
    fn from_upload(uploaded: &UploadedFile) -> Self {
        uploaded.url.clone()
    }
}

impl FromUpload for FileRecord {
    fn from_upload(uploaded: &UploadedFile) -> Self {
        Self::new(uploaded.url.clone(), Utc::now())
    }
}

/// Where an upload came from (reported to telemetry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadSource {
    Widget,
    Paste,
}

impl UploadSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Widget => "widget",
            Self::Paste => "paste",
        }
    }
}

/// Per-gallery behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionOptions {
    pub constraints: UploadConstraints,
    /// Delete each entry's hosted file before clearing the list
    pub delete_hosted_on_clear: bool,
}

impl CollectionOptions {
    pub fn media() -> Self {
        Self {
            constraints: UploadConstraints::images(),
            delete_hosted_on_clear: true,
        }
    }

    pub fn files() -> Self {
        Self {
            constraints: UploadConstraints::documents(),
            delete_hosted_on_clear: false,
        }
    }
}

/// Outcome of a confirmed (or declined) bulk clear
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub declined: bool,
    pub deleted: usize,
    /// URLs with no derivable external id
    pub skipped: Vec<String>,
    pub failures: Vec<DeleteFailure>,
}

impl ClearReport {
    fn declined() -> Self {
        Self {
            declined: true,
            ..Self::default()
        }
    }

    pub fn partial_error(&self) -> Option<PartialDeleteError> {
        (!self.failures.is_empty()).then(|| PartialDeleteError {
            failures: self.failures.clone(),
        })
    }
}

/// Outcome of a batch upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchUpload<E> {
    pub appended: Vec<E>,
    /// File name and error for each upload that failed
    pub failures: Vec<(String, UploadError)>,
}

/// An ordered list of entries mirrored into a local buffer
#[derive(Clone)]
pub struct SyncedCollection<E: CollectionEntry> {
    store: Arc<dyn DocumentStore>,
    uploads: Arc<dyn UploadService>,
    key: DocumentKey,
    path: DocumentPath,
    options: Arc<CollectionOptions>,
    mirror: Arc<Mirror<Vec<E>>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl<E: CollectionEntry> SyncedCollection<E> {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        uploads: Arc<dyn UploadService>,
        key: DocumentKey,
        options: CollectionOptions,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            store,
            uploads,
            path: key.path(),
            key,
            options: Arc::new(options),
            mirror: Mirror::new(Vec::new()),
            telemetry,
        }
    }

    pub const fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub const fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    /// Subscribe to the document. A second call on an attached widget is a no-op.
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
        tracing::debug!(path = %self.path, "collection attached");
        Ok(())
    }

    pub fn detach(&self) {
        if self.mirror.detach() {
            tracing::debug!(path = %self.path, "collection detached");
        }
    }

    /// Append one entry; returns the list as written
    pub async fn append_one(&self, entry: E) -> Result<Vec<E>, WidgetError> {
        self.append_many(vec![entry]).await
    }

    /// Append a batch in one read-modify-write; returns the list as written
    pub async fn append_many(&self, entries: Vec<E>) -> Result<Vec<E>, WidgetError> {
        self.mirror.begin_op(false, |_| ())?;
        let result = self.append_entries(entries).await;
        self.mirror.end_op(false, result.as_ref().err().cloned(), |_, _| {});
        result
    }

    async fn append_entries(&self, entries: Vec<E>) -> Result<Vec<E>, WidgetError> {
        let mut items = self.remote_items().await.map_err(|e| match e {
            LoadError::Store(e) => WidgetError::from(SaveError::Store(e)),
            shape @ LoadError::Shape(_) => WidgetError::from(shape),
        })?;
        let added = entries.len();
        items.extend(entries);

        let fields = CollectionDocument::new(items.clone())
            .into_fields()
            .map_err(SaveError::Encode)?;
        if let Err(e) = self.store.set_merge(&self.path, fields).await {
            let error = WidgetError::from(SaveError::Store(e));
            tracing::warn!(path = %self.path, error = %error, "append failed");
            return Err(error);
        }
        tracing::debug!(path = %self.path, added, total = items.len(), "appended");
        Ok(items)
    }

    /// Empty the collection
    ///
    /// Does nothing unless `confirmed`. The entries to clean up come from a
    /// fresh read, so a stale or not yet synced buffer cannot hide hosted
    /// files; the local buffer is only used when that read fails. Hosted files
    /// are deleted first when the gallery is configured to; a failed delete is
    /// logged and reported but never stops the remaining deletes or the store
    /// clear. The buffer empties when the store's snapshot arrives.
    pub async fn clear_all(&self, confirmed: bool) -> Result<ClearReport, WidgetError> {
        if !confirmed {
            return Ok(ClearReport::declined());
        }
        let buffered = self.mirror.begin_op(true, |view| view.buffer.clone())?;
        let entries = self.remote_items().await.unwrap_or_else(|error| {
            tracing::warn!(
                path = %self.path,
                error = %error,
                "fresh read before clear failed, using local entries"
            );
            buffered
        });

        let mut report = ClearReport::default();
        if self.options.delete_hosted_on_clear {
            for entry in &entries {
                self.delete_hosted(entry.url(), &mut report).await;
            }
        }

        let fields = CollectionDocument::<E>::default()
            .into_fields()
            .map_err(SaveError::Encode);
        let written = match fields {
            Ok(fields) => self
                .store
                .set_merge(&self.path, fields)
                .await
                .map_err(|e| WidgetError::from(SaveError::Store(e))),
            Err(e) => Err(WidgetError::from(e)),
        };

        let error = match &written {
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "clear failed");
                Some(e.clone())
            }
            Ok(()) => report.partial_error().map(WidgetError::PartialDelete),
        };
        self.mirror.end_op(true, error, |_, _| {});
        written?;

        tracing::info!(
            path = %self.path,
            entries = entries.len(),
            deleted = report.deleted,
            failed = report.failures.len(),
            skipped = report.skipped.len(),
            "collection cleared"
        );
        self.telemetry.emit(if self.key.kind() == ContentKind::Media {
            TelemetryEvent::new("media_delete_all")
                .with("deleted_count", report.deleted)
                .with("failed_count", report.failures.len())
        } else {
            TelemetryEvent::new(format!("{}_cleared", self.key.kind().as_str()))
                .with("count", entries.len())
        });
        Ok(report)
    }

    /// Entries as the store holds them right now
    async fn remote_items(&self) -> Result<Vec<E>, LoadError> {
        match self.store.get(&self.path).await? {
            Some(doc) => Ok(CollectionDocument::<E>::from_document(&doc)?.items),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_hosted(&self, url: &str, report: &mut ClearReport) {
        let Some(id) = external_id(url) else {
            tracing::warn!(url, "no external id in url, hosted file left in place");
            report.skipped.push(url.to_string());
            return;
        };
        match self.uploads.delete(&id).await {
            Ok(()) => report.deleted += 1,
            Err(error) => {
                tracing::warn!(url, external_id = %id, error = %error, "hosted delete failed");
                report.failures.push(DeleteFailure {
                    url: url.to_string(),
                    external_id: id,
                    error,
                });
            }
        }
    }

    fn event(&self, suffix: &str) -> String {
        let prefix = match self.key.kind() {
            ContentKind::Media => "media",
            ContentKind::Files => "file",
            other => other.as_str(),
        };
        format!("{prefix}_{suffix}")
    }

    pub fn items(&self) -> Vec<E> {
        self.mirror.buffer()
    }

    pub fn view(&self) -> SyncView<Vec<E>> {
        self.mirror.view()
    }

    pub fn watch(&self) -> watch::Receiver<SyncView<Vec<E>>> {
        self.mirror.watch()
    }

    pub fn is_detached(&self) -> bool {
        self.mirror.is_detached()
    }

    /// Wait until the view satisfies `pred`
    pub async fn wait_for(&self, pred: impl FnMut(&SyncView<Vec<E>>) -> bool) -> SyncView<Vec<E>> {
        self.mirror.wait_for(pred).await
    }
}

impl<E: FromUpload> SyncedCollection<E> {
    /// Upload one file and append its entry
    pub async fn upload_and_append(
        &self,
        file: UploadFile,
        source: UploadSource,
    ) -> Result<E, WidgetError> {
        self.mirror.begin_op(false, |_| ())?;
        let result = match self.upload_one(file, source).await {
            Ok(entry) => self
                .append_entries(vec![entry.clone()])
                .await
                .map(|_| entry),
            Err(e) => Err(WidgetError::Upload(e)),
        };
        self.mirror.end_op(false, result.as_ref().err().cloned(), |_, _| {});
        result
    }

    /// Upload a batch and append every successful upload in one write
    pub async fn upload_many(
        &self,
        files: Vec<UploadFile>,
        source: UploadSource,
    ) -> Result<BatchUpload<E>, WidgetError> {
        self.mirror.begin_op(false, |_| ())?;
        let mut appended = Vec::new();
        let mut failures = Vec::new();
        for file in files {
            let name = file.name.clone();
            match self.upload_one(file, source).await {
                Ok(entry) => appended.push(entry),
                Err(e) => failures.push((name, e)),
            }
        }

        let result = if appended.is_empty() {
            Ok(())
        } else {
            self.append_entries(appended.clone()).await.map(|_| ())
        };
        let error = match &result {
            Err(e) => Some(e.clone()),
            Ok(()) => failures.first().map(|(_, e)| WidgetError::Upload(e.clone())),
        };
        self.mirror.end_op(false, error, |_, _| {});
        result.map(|()| BatchUpload { appended, failures })
    }

    async fn upload_one(&self, file: UploadFile, source: UploadSource) -> Result<E, UploadError> {
        let name = file.name.clone();
        let fallback_format = file.format().unwrap_or_default();
        let size = file.size();
        match self.uploads.upload(file, &self.options.constraints).await {
            Ok(uploaded) => {
                self.telemetry.emit(
                    TelemetryEvent::new(self.event("upload_success"))
                        .with("file_size", uploaded.size_bytes)
                        .with("file_format", uploaded.format.clone())
                        .with("upload_method", source.as_str()),
                );
                Ok(E::from_upload(&uploaded))
            }
            Err(e) => {
                tracing::warn!(path = %self.path, file = %name, error = %e, "upload failed");
                self.telemetry.emit(
                    TelemetryEvent::new(self.event("upload_failed"))
                        .with("file_size", size)
                        .with("file_format", fallback_format)
                        .with("upload_method", source.as_str())
                        .with("error", e.to_string()),
                );
                Err(e)
            }
        }
    }
}

impl<E: CollectionEntry> fmt::Debug for SyncedCollection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedCollection")
            .field("path", &self.path)
            .field("items", &self.mirror.buffer())
            .finish_non_exhaustive()
    }
}

fn apply_event<E: CollectionEntry>(
    path: &DocumentPath,
    mirror: &Mirror<Vec<E>>,
    event: SnapshotEvent,
) {
    let remote = event.map_err(LoadError::from).and_then(|snapshot| {
        snapshot
            .document
            .as_ref()
            .map_or_else(|| Ok(CollectionDocument::default()), CollectionDocument::from_document)
            .map_err(LoadError::from)
    });
    match remote {
        Ok(doc) => mirror.apply_remote(Some(doc.items), false),
        Err(error) => {
            tracing::warn!(path = %path, error = %error, "collection load failed");
            mirror.apply_load_error(error);
        }
    }
}
