//! Shared document types for SyncNote
//!
//! Defines how documents are keyed and laid out in the remote store, and the
//! typed views (scalar text, append-only collections) the widgets sync.

pub mod document;
pub mod entry;
pub mod key;

pub use document::{CollectionDocument, Document, DocumentError, ScalarDocument};
pub use entry::{CollectionEntry, FileRecord};
pub use key::{ContentKind, DocumentKey, DocumentPath, KeyError, Layout};
