//! Widget error taxonomy
//!
//! Every widget operation catches failures at its boundary and reports them as
//! a [`WidgetError`]; the same value is kept as the view's last error so the
//! UI can show a message and offer a retry.

use syncnote_protocol::DocumentError;
use syncnote_store::{StoreError, UploadError};

/// The live subscription (or a read) failed, or the document had the wrong shape
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Shape(#[from] DocumentError),
}

/// A merge write was rejected or could not be encoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Encode(#[from] DocumentError),
}

/// One hosted file that could not be removed during a bulk clear
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub url: String,
    pub external_id: String,
    pub error: UploadError,
}

/// Some hosted deletes failed; the store clear still went ahead
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} hosted file(s) could not be deleted", failures.len())]
pub struct PartialDeleteError {
    pub failures: Vec<DeleteFailure>,
}

/// Error surfaced by a widget operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WidgetError {
    #[error("Error loading document: {0}")]
    Load(#[from] LoadError),
    #[error("Error saving: {0}")]
    Save(#[from] SaveError),
    #[error("Error uploading: {0}")]
    Upload(#[from] UploadError),
    #[error("Error deleting hosted files: {0}")]
    PartialDelete(#[from] PartialDeleteError),
    #[error("a write is already in progress")]
    Busy,
    #[error("widget is detached")]
    Detached,
}

impl WidgetError {
    /// Message shown to the user
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Whether re-running the failed operation is safe (save and reload are idempotent)
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Load(_) | Self::Save(_))
    }

    pub const fn is_load(&self) -> bool {
        matches!(self, Self::Load(_))
    }
}
