//! Document keys and store paths
//!
//! A [`DocumentKey`] is derived from `(identity_id, content_kind)` and is stable
//! for the lifetime of an identity. A [`DocumentPath`] is where that key lives in
//! the store: either a shared top-level collection (`texts/u1-notes`) or a
//! per-identity subtree (`users/u1/quicknotes/u1-quicknotes`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors raised while building keys and paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("identity id must not be empty")]
    EmptyIdentity,
    #[error("identity id may not contain '/': {0}")]
    InvalidIdentity(String),
    #[error("unknown content kind: {0}")]
    UnknownKind(String),
}

/// Where a content kind's documents live in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// `{kind}/{key}`
    Shared,
    /// `users/{identity_id}/{kind}/{key}`
    IdentityScoped,
}

/// Kind of content a widget syncs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Primary shared note
    Texts,
    /// Per-identity scratch note
    #[serde(rename = "quicknotes")]
    QuickNotes,
    /// Image gallery
    Media,
    /// File gallery
    Files,
}

impl ContentKind {
    pub const ALL: [Self; 4] = [Self::Texts, Self::QuickNotes, Self::Media, Self::Files];

    /// Store collection name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Texts => "texts",
            Self::QuickNotes => "quicknotes",
            Self::Media => "media",
            Self::Files => "files",
        }
    }

    /// Suffix appended to the identity id to form the document key
    pub const fn key_suffix(self) -> &'static str {
        match self {
            Self::Texts => "notes",
            Self::QuickNotes => "quicknotes",
            Self::Media => "media",
            Self::Files => "files",
        }
    }

    pub const fn layout(self) -> Layout {
        match self {
            Self::Texts | Self::Media => Layout::Shared,
            Self::QuickNotes | Self::Files => Layout::IdentityScoped,
        }
    }

    /// Whether documents of this kind hold an append-only `items` sequence
    pub const fn is_collection(self) -> bool {
        matches!(self, Self::Media | Self::Files)
    }

    /// Name of the synced field inside the document
    pub const fn field(self) -> &'static str {
        if self.is_collection() {
            crate::document::ITEMS_FIELD
        } else {
            crate::document::CONTENT_FIELD
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "texts" => Ok(Self::Texts),
            "quicknotes" => Ok(Self::QuickNotes),
            "media" => Ok(Self::Media),
            "files" => Ok(Self::Files),
            other => Err(KeyError::UnknownKind(other.to_string())),
        }
    }
}

fn validate_identity(identity_id: &str) -> Result<(), KeyError> {
    if identity_id.is_empty() {
        return Err(KeyError::EmptyIdentity);
    }
    if identity_id.contains('/') {
        return Err(KeyError::InvalidIdentity(identity_id.to_string()));
    }
    Ok(())
}

/// Deterministic per-identity document key, e.g. `u1-notes`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    identity_id: String,
    kind: ContentKind,
    key: String,
}

impl DocumentKey {
    pub fn new(identity_id: impl Into<String>, kind: ContentKind) -> Result<Self, KeyError> {
        let identity_id = identity_id.into();
        validate_identity(&identity_id)?;
        let key = format!("{identity_id}-{}", kind.key_suffix());
        Ok(Self {
            identity_id,
            kind,
            key,
        })
    }

    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    pub const fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Resolve the store path for this key according to its kind's layout
    pub fn path(&self) -> DocumentPath {
        match self.kind.layout() {
            Layout::Shared => DocumentPath(format!("{}/{}", self.kind.as_str(), self.key)),
            Layout::IdentityScoped => DocumentPath(format!(
                "users/{}/{}/{}",
                self.identity_id,
                self.kind.as_str(),
                self.key
            )),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Hierarchical store path (`/`-separated, no leading or trailing slash)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(String);

impl DocumentPath {
    /// Normalize a raw path (trim whitespace and surrounding slashes, collapse `//`)
    pub fn new(raw: &str) -> Self {
        let joined = raw
            .trim()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    /// Profile document of an identity: `users/{identity_id}`
    pub fn profile(identity_id: &str) -> Result<Self, KeyError> {
        validate_identity(identity_id)?;
        Ok(Self(format!("users/{identity_id}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Last path segment (the document id)
    pub fn document_id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<&DocumentKey> for DocumentPath {
    fn from(key: &DocumentKey) -> Self {
        key.path()
    }
}
