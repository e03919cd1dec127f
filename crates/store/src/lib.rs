//! Document store and upload service layer
//!
//! Everything the sync widgets talk to goes through two traits:
//! [`DocumentStore`] (get / live subscribe / merge write) and
//! [`UploadService`] (upload a file, delete it by external id).

pub mod backend;
pub mod error;
pub mod http;
pub mod local;
pub mod memory;
pub mod merge;
pub mod subscription;
pub mod upload;

pub use backend::{DocumentStore, Snapshot, SnapshotEvent};
pub use error::StoreError;
pub use http::{HttpUploadConfig, HttpUploadService};
pub use local::JsonFileStore;
pub use memory::MemoryStore;
pub use subscription::{Subscription, Unsubscriber};
pub use upload::{
    MemoryUploads, ResourceType, UploadConstraints, UploadError, UploadFile, UploadService,
    UploadedFile,
};
