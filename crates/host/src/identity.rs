//! Signed-in identity and the provider that tracks it
//!
//! The identity is handed explicitly to every widget that needs it. Roles are
//! resolved once, when the provider accepts a sign-in, and never re-checked
//! by widgets.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use syncnote_protocol::{ContentKind, DocumentKey, DocumentPath, KeyError};
use tokio::sync::watch;

/// Capability level of an identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Owner,
}

impl Role {
    /// Owners get the file gallery
    pub const fn can_share_files(self) -> bool {
        matches!(self, Self::Owner)
    }
}

/// Claims as the auth provider reports them, before a role is attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: String,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl Identity {
    pub fn new(claims: Claims, role: Role) -> Self {
        Self {
            id: claims.id,
            display_name: claims.display_name,
            email: claims.email,
            avatar_url: claims.avatar_url,
            role,
        }
    }

    /// This identity's document key for a kind of content
    pub fn key(&self, kind: ContentKind) -> Result<DocumentKey, KeyError> {
        DocumentKey::new(self.id.clone(), kind)
    }

    /// `users/{id}`
    pub fn profile_path(&self) -> Result<DocumentPath, KeyError> {
        DocumentPath::profile(&self.id)
    }
}

/// Source of the current identity
///
/// `watch` yields every transition (sign-in, sign-out, switch); consumers
/// re-subscribe their documents when it changes.
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Option<Identity>;

    fn watch(&self) -> watch::Receiver<Option<Identity>>;
}

/// Provider driven in-process: the embedding app calls `sign_in`/`sign_out`
#[derive(Debug)]
pub struct LocalIdentityProvider {
    owners: HashSet<String>,
    tx: watch::Sender<Option<Identity>>,
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl LocalIdentityProvider {
    /// `owners` are the identity ids granted [`Role::Owner`]
    pub fn new<I, S>(owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, _rx) = watch::channel(None);
        Self {
            owners: owners.into_iter().map(Into::into).collect(),
            tx,
        }
    }

    pub fn resolve_role(&self, id: &str) -> Role {
        if self.owners.contains(id) {
            Role::Owner
        } else {
            Role::Member
        }
    }

    /// Accept a sign-in, resolving the role once
    pub fn sign_in(&self, claims: Claims) -> Identity {
        let role = self.resolve_role(&claims.id);
        let identity = Identity::new(claims, role);
        tracing::info!(id = %identity.id, role = ?identity.role, "signed in");
        self.tx.send_replace(Some(identity.clone()));
        identity
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.tx.send_replace(None) {
            tracing::info!(id = %previous.id, "signed out");
        }
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}
