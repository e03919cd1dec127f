//! Upload service contract
//!
//! The media host is opaque: hand it a file plus constraints, get back a
//! permanent URL. Constraint enforcement is the service's job, not the
//! caller's; [`UploadConstraints::check`] is what services call to do it.

mod memory;

pub use memory::MemoryUploads;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Default size cap for both galleries (10 MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10_000_000;

/// Failure reported by the upload service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("file too large: {size} bytes exceeds limit of {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("format not allowed: {0}")]
    FormatNotAllowed(String),
    #[error("upload rejected: {0}")]
    Rejected(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error("no hosted file with id {0}")]
    NotFound(String),
}

/// Kind of hosted resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Raw,
    Auto,
}

impl ResourceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Raw => "raw",
            Self::Auto => "auto",
        }
    }
}

/// Limits the service enforces on one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConstraints {
    pub max_file_size: u64,
    /// Lowercase extensions; empty means any format
    pub allowed_formats: Vec<String>,
    pub resource_type: ResourceType,
}

impl UploadConstraints {
    /// Media gallery: png, gif, jpeg, jpg
    pub fn images() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_formats: ["png", "gif", "jpeg", "jpg"].map(String::from).to_vec(),
            resource_type: ResourceType::Image,
        }
    }

    /// File gallery: archives, PDFs, office documents
    pub fn documents() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_formats: ["zip", "pdf", "doc", "docx", "xls", "xlsx"]
                .map(String::from)
                .to_vec(),
            resource_type: ResourceType::Raw,
        }
    }

    /// Any format up to `max_file_size`
    pub const fn any(max_file_size: u64) -> Self {
        Self {
            max_file_size,
            allowed_formats: Vec::new(),
            resource_type: ResourceType::Auto,
        }
    }

    pub fn allows_format(&self, format: &str) -> bool {
        self.allowed_formats.is_empty()
            || self
                .allowed_formats
                .iter()
                .any(|f| f.eq_ignore_ascii_case(format))
    }

    /// Reject files that break the size or format limits
    pub fn check(&self, file: &UploadFile) -> Result<(), UploadError> {
        if file.size() > self.max_file_size {
            return Err(UploadError::TooLarge {
                size: file.size(),
                limit: self.max_file_size,
            });
        }
        if !self.allowed_formats.is_empty() {
            match file.format() {
                Some(format) if self.allows_format(&format) => {}
                Some(format) => return Err(UploadError::FormatNotAllowed(format)),
                None => return Err(UploadError::FormatNotAllowed(file.name.clone())),
            }
        }
        Ok(())
    }
}

/// A file handed to the upload service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Lowercase file extension
    pub fn format(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(str::to_ascii_lowercase)
    }

    /// Declared content type, or one guessed from the name
    pub fn mime(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        })
    }
}

/// What the service returns for a stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub url: String,
    pub size_bytes: u64,
    pub format: String,
}

/// Upload service trait
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Store a file and return its permanent URL
    async fn upload(
        &self,
        file: UploadFile,
        constraints: &UploadConstraints,
    ) -> Result<UploadedFile, UploadError>;

    /// Remove a hosted file by its external id
    async fn delete(&self, external_id: &str) -> Result<(), UploadError>;
}
