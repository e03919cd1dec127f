//! Per-identity dashboard and the shell that follows sign-in state
//!
//! A [`Dashboard`] owns the widgets of one signed-in identity: primary note,
//! quick note, media gallery, and (for owners) the file gallery. The
//! [`SessionShell`] tears it down and builds a new one on every identity
//! transition, so no widget ever outlives the identity it was keyed for.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use syncnote_protocol::{ContentKind, Document, FileRecord, KeyError};
use syncnote_store::{DocumentStore, StoreError, UploadService};
use tokio::sync::watch;

use crate::error::WidgetError;
use crate::identity::{Identity, IdentityProvider};
use crate::sync::collection::{CollectionOptions, SyncedCollection};
use crate::sync::scalar::SyncedScalar;
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// Backends every widget talks to
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub uploads: Arc<dyn UploadService>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl Services {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        uploads: Arc<dyn UploadService>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            store,
            uploads,
            telemetry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MountError {
    #[error("invalid identity: {0}")]
    Key(#[from] KeyError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Widget(#[from] WidgetError),
}

/// Create `users/{id}` on first sign-in; returns whether it was created
///
/// An existing profile is never touched.
pub async fn ensure_profile(
    store: &dyn DocumentStore,
    identity: &Identity,
) -> Result<bool, MountError> {
    let path = identity.profile_path()?;
    if store.exists(&path).await? {
        return Ok(false);
    }

    let mut profile = Document::new();
    profile.insert("email".to_string(), Value::from(identity.email.clone()));
    profile.insert("name".to_string(), Value::from(identity.display_name.clone()));
    profile.insert(
        "photoURL".to_string(),
        identity.avatar_url.clone().map_or(Value::Null, Value::from),
    );
    profile.insert("createdAt".to_string(), Value::from(Utc::now().to_rfc3339()));
    store.set_merge(&path, profile).await?;
    Ok(true)
}

/// The widgets of one signed-in identity
pub struct Dashboard {
    identity: Identity,
    notes: SyncedScalar,
    quick_note: SyncedScalar,
    media: SyncedCollection<String>,
    files: Option<SyncedCollection<FileRecord>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Dashboard {
    /// Build and attach every widget the identity is entitled to
    pub async fn mount(services: &Services, identity: Identity) -> Result<Self, MountError> {
        let notes_key = identity.key(ContentKind::Texts)?;
        let quick_key = identity.key(ContentKind::QuickNotes)?;
        let media_key = identity.key(ContentKind::Media)?;
        let files_key = identity
            .role
            .can_share_files()
            .then(|| identity.key(ContentKind::Files))
            .transpose()?;

        match ensure_profile(services.store.as_ref(), &identity).await {
            Ok(true) => tracing::info!(id = %identity.id, "profile created"),
            Ok(false) => {}
            Err(e) => tracing::warn!(id = %identity.id, error = %e, "could not ensure profile"),
        }

        let notes =
            SyncedScalar::new(services.store.clone(), notes_key, services.telemetry.clone());
        let quick_note =
            SyncedScalar::new(services.store.clone(), quick_key, services.telemetry.clone());
        let media = SyncedCollection::new(
            services.store.clone(),
            services.uploads.clone(),
            media_key,
            CollectionOptions::media(),
            services.telemetry.clone(),
        );
        let files = files_key.map(|key| {
            SyncedCollection::new(
                services.store.clone(),
                services.uploads.clone(),
                key,
                CollectionOptions::files(),
                services.telemetry.clone(),
            )
        });

        let dashboard = Self {
            identity,
            notes,
            quick_note,
            media,
            files,
            telemetry: services.telemetry.clone(),
        };
        dashboard.notes.attach()?;
        dashboard.quick_note.attach()?;
        dashboard.media.attach()?;
        if let Some(files) = &dashboard.files {
            files.attach()?;
        }

        tracing::info!(
            id = %dashboard.identity.id,
            files = dashboard.files.is_some(),
            "dashboard mounted"
        );
        dashboard.telemetry.emit(
            TelemetryEvent::new("dashboard_mounted")
                .with("user_id", dashboard.identity.id.clone())
                .with("files_enabled", dashboard.files.is_some()),
        );
        Ok(dashboard)
    }

    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    pub const fn notes(&self) -> &SyncedScalar {
        &self.notes
    }

    pub const fn quick_note(&self) -> &SyncedScalar {
        &self.quick_note
    }

    pub const fn media(&self) -> &SyncedCollection<String> {
        &self.media
    }

    /// Only present for identities allowed to share files
    pub const fn files(&self) -> Option<&SyncedCollection<FileRecord>> {
        self.files.as_ref()
    }

    /// Detach every widget
    ///
    /// In-flight writes still complete against the store, but nothing is
    /// applied to the widgets afterwards.
    pub fn unmount(self) {
        tracing::info!(id = %self.identity.id, "dashboard unmounted");
        self.telemetry.emit(
            TelemetryEvent::new("dashboard_unmounted").with("user_id", self.identity.id.clone()),
        );
        // Drop detaches
    }

    fn detach_all(&self) {
        self.notes.detach();
        self.quick_note.detach();
        self.media.detach();
        if let Some(files) = &self.files {
            files.detach();
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.detach_all();
    }
}

/// Keeps one dashboard mounted for whoever is signed in
pub struct SessionShell {
    services: Services,
    identity: watch::Receiver<Option<Identity>>,
    dashboard: Option<Dashboard>,
}

impl SessionShell {
    pub fn new(services: Services, provider: &dyn IdentityProvider) -> Self {
        Self {
            services,
            identity: provider.watch(),
            dashboard: None,
        }
    }

    pub const fn dashboard(&self) -> Option<&Dashboard> {
        self.dashboard.as_ref()
    }

    /// Mount or unmount so the dashboard matches the current identity
    pub async fn sync_identity(&mut self) -> Result<(), MountError> {
        let next = self.identity.borrow_and_update().clone();
        let unchanged = match (&self.dashboard, &next) {
            (Some(dashboard), Some(next)) => dashboard.identity() == next,
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }

        if let Some(previous) = self.dashboard.take() {
            previous.unmount();
        }
        if let Some(identity) = next {
            self.dashboard = Some(Dashboard::mount(&self.services, identity).await?);
        }
        Ok(())
    }

    /// Wait for the next identity transition and follow it
    ///
    /// Returns `false` once the provider has gone away.
    pub async fn follow_next(&mut self) -> Result<bool, MountError> {
        if self.identity.changed().await.is_err() {
            return Ok(false);
        }
        self.sync_identity().await?;
        Ok(true)
    }

    pub fn shutdown(mut self) {
        if let Some(dashboard) = self.dashboard.take() {
            dashboard.unmount();
        }
    }
}
