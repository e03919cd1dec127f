//! In-memory upload service for tests and local development
//!
//! Hands out versioned URLs shaped like a hosted media CDN's
//! (`{base}/{resource}/upload/v{version}/{folder}/{name}.{ext}`), so the
//! external-id derivation used on bulk clear works against it unchanged.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::{ResourceType, UploadConstraints, UploadError, UploadFile, UploadService, UploadedFile};

const FIRST_VERSION: u64 = 1_700_000_000;

#[derive(Debug, Clone)]
struct HostedFile {
    data: Bytes,
    resource_type: ResourceType,
}

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<String, HostedFile>,
    next_version: u64,
    failing_deletes: HashSet<String>,
    fail_all_deletes: bool,
    reject_uploads: Option<String>,
}

/// In-memory media host
#[derive(Debug)]
pub struct MemoryUploads {
    base_url: String,
    folder: String,
    inner: Mutex<Inner>,
}

impl Default for MemoryUploads {
    fn default() -> Self {
        Self::new("https://media.local/demo", "syncnote")
    }
}

impl MemoryUploads {
    pub fn new(base_url: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            folder: folder.into(),
            inner: Mutex::new(Inner {
                next_version: FIRST_VERSION,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make deletes of one external id fail
    pub fn fail_delete(&self, external_id: impl Into<String>) {
        self.lock().failing_deletes.insert(external_id.into());
    }

    /// Make every delete fail
    pub fn fail_all_deletes(&self, fail: bool) {
        self.lock().fail_all_deletes = fail;
    }

    /// Reject every upload with `reason` (or stop rejecting with `None`)
    pub fn reject_uploads(&self, reason: Option<String>) {
        self.lock().reject_uploads = reason;
    }

    pub fn contains(&self, external_id: &str) -> bool {
        self.lock().files.contains_key(external_id)
    }

    pub fn hosted_count(&self) -> usize {
        self.lock().files.len()
    }

    /// Stored bytes of a hosted file
    pub fn data(&self, external_id: &str) -> Option<Bytes> {
        self.lock().files.get(external_id).map(|f| f.data.clone())
    }

    fn external_id_for(&self, file: &UploadFile) -> String {
        let stem: String = std::path::Path::new(&file.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();
        format!("{}/{stem}_{}", self.folder, suffix.to_ascii_lowercase())
    }
}

#[async_trait]
impl UploadService for MemoryUploads {
    async fn upload(
        &self,
        file: UploadFile,
        constraints: &UploadConstraints,
    ) -> Result<UploadedFile, UploadError> {
        constraints.check(&file)?;
        let format = file.format().unwrap_or_else(|| "bin".to_string());
        let external_id = self.external_id_for(&file);

        let mut inner = self.lock();
        if let Some(reason) = &inner.reject_uploads {
            return Err(UploadError::Rejected(reason.clone()));
        }
        let version = inner.next_version;
        inner.next_version += 1;

        let resource_type = match constraints.resource_type {
            ResourceType::Auto if file.mime().starts_with("image/") => ResourceType::Image,
            ResourceType::Auto => ResourceType::Raw,
            other => other,
        };
        let url = format!(
            "{}/{}/upload/v{version}/{external_id}.{format}",
            self.base_url,
            resource_type.as_str()
        );
        let size_bytes = file.size();
        inner.files.insert(
            external_id,
            HostedFile {
                data: file.data,
                resource_type,
            },
        );

        Ok(UploadedFile {
            url,
            size_bytes,
            format,
        })
    }

    async fn delete(&self, external_id: &str) -> Result<(), UploadError> {
        let mut inner = self.lock();
        if inner.fail_all_deletes || inner.failing_deletes.contains(external_id) {
            return Err(UploadError::Transfer(format!("delete of {external_id} failed")));
        }
        match inner.files.remove(external_id) {
            Some(file) => {
                tracing::debug!(external_id, resource = file.resource_type.as_str(), "hosted file deleted");
                Ok(())
            }
            None => Err(UploadError::NotFound(external_id.to_string())),
        }
    }
}
