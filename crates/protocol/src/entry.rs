//! Collection entry payloads
//!
//! Entries are opaque to the sync protocol; the only thing it needs is the
//! hosted URL, which is how hosted media gets cleaned up on a bulk clear.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Anything that can live in a collection document's `items`
pub trait CollectionEntry:
    Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + Sync + 'static
{
    /// Permanent URL of the hosted file behind this entry
    fn url(&self) -> &str;
}

/// Media gallery entries are bare URLs
impl CollectionEntry for String {
    fn url(&self) -> &str {
        self
    }
}

/// File gallery entry: `{ url, uploadedAt }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(url: impl Into<String>, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            uploaded_at,
        }
    }

    /// Display name: the last URL path segment
    pub fn file_name(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().unwrap_or(path)
    }
}

impl CollectionEntry for FileRecord {
    fn url(&self) -> &str {
        &self.url
    }
}
