// syncnote-host library
// Real-time synced notes and media galleries on top of syncnote-store

// Synchronized document widgets
pub mod sync;

// Widget error taxonomy
pub mod error;

// Signed-in identity
pub mod identity;

// Per-identity dashboard and session shell
pub mod dashboard;

// Analytics events
pub mod telemetry;

// Configuration
pub mod config;

// Upload proxy REST API
pub mod api;

pub use dashboard::{Dashboard, MountError, Services, SessionShell};
pub use error::{LoadError, PartialDeleteError, SaveError, WidgetError};
pub use identity::{Claims, Identity, IdentityProvider, LocalIdentityProvider, Role};
pub use sync::collection::{
    external_id, BatchUpload, ClearReport, CollectionOptions, SyncedCollection, UploadSource,
};
pub use sync::scalar::SyncedScalar;
pub use sync::{Phase, SyncView};
