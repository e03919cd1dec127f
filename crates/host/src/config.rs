//! Configuration system for syncnote
//!
//! Reads config from ~/.config/syncnote/config.toml

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use syncnote_store::upload::DEFAULT_MAX_FILE_SIZE;
use syncnote_store::HttpUploadConfig;

use crate::identity::LocalIdentityProvider;

pub const API_KEY_ENV: &str = "SYNCNOTE_UPLOAD_API_KEY";
pub const API_SECRET_ENV: &str = "SYNCNOTE_UPLOAD_API_SECRET";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file backing the store; in-memory when unset
    pub path: Option<PathBuf>,
}

/// Hosted media configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub api_base: String,
    /// Uploads stay in memory when unset
    pub cloud_name: Option<String>,
    pub upload_preset: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            api_base: syncnote_store::http::DEFAULT_API_BASE.to_string(),
            cloud_name: None,
            upload_preset: "syncnote".to_string(),
            api_key: None,
            api_secret: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl UploadConfig {
    /// Settings for the HTTP upload service, if a cloud is configured
    pub fn http_config(&self) -> Option<HttpUploadConfig> {
        let cloud_name = self.cloud_name.clone().filter(|c| !c.is_empty())?;
        Some(HttpUploadConfig {
            api_base: self.api_base.clone(),
            cloud_name,
            upload_preset: self.upload_preset.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
        })
    }
}

/// Identity configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Identity ids granted the owner role
    pub admins: Vec<String>,
}

impl IdentityConfig {
    /// Identity provider that grants `admins` the owner role at sign-in
    pub fn provider(&self) -> LocalIdentityProvider {
        LocalIdentityProvider::new(self.admins.iter().cloned())
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub upload: UploadConfig,
    pub identity: IdentityConfig,
}

const DEFAULT_CONFIG: &str = r#"# syncnote Configuration

[server]
bind = "127.0.0.1"
port = 8080

[store]
# path = "/var/lib/syncnote/documents.json"

[upload]
api_base = "https://api.cloudinary.com/v1_1"
# cloud_name = "my-cloud"
upload_preset = "syncnote"
max_file_size = 10000000
# Deletes need credentials; prefer SYNCNOTE_UPLOAD_API_KEY / SYNCNOTE_UPLOAD_API_SECRET
# api_key = ""
# api_secret = ""

[identity]
admins = []
"#;

impl Config {
    /// Load configuration from default path, falling back to defaults
    pub fn load() -> Self {
        let config_path = Self::default_config_path();
        let config = if config_path.exists() {
            Self::load_from_path(&config_path).unwrap_or_else(|e| {
                tracing::warn!(path = %config_path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            })
        } else {
            Self::default()
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("syncnote")
            .join("config.toml")
    }

    /// Load from specific path
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Apply secret overrides from the environment (`lookup` is `std::env::var` in production)
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.upload.api_key = Some(key);
        }
        if let Some(secret) = lookup(API_SECRET_ENV).filter(|v| !v.is_empty()) {
            self.upload.api_secret = Some(secret);
        }
        self
    }

    /// Create default config file if it doesn't exist
    pub fn create_default_if_missing() {
        let path = Self::default_config_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = std::fs::write(&path, DEFAULT_CONFIG);
        }
    }
}
