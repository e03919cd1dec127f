//! HTTP upload service for a hosted media CDN
//!
//! Speaks the Cloudinary-style REST API:
//! - upload: `POST {api_base}/{cloud}/{resource}/upload` (multipart, unsigned preset)
//! - delete: `POST {api_base}/{cloud}/image/destroy` (signed with the API secret)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::upload::{ResourceType, UploadConstraints, UploadError, UploadFile, UploadService, UploadedFile};

pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Connection settings for the hosted media API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpUploadConfig {
    pub api_base: String,
    pub cloud_name: String,
    pub upload_preset: String,
    /// Needed for deletes only
    pub api_key: Option<String>,
    /// Needed for deletes only
    pub api_secret: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Sign request parameters: sorted `k=v` pairs joined by `&`, secret appended, SHA-256 hex
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Upload service backed by the hosted media API
pub struct HttpUploadService {
    client: reqwest::Client,
    config: HttpUploadConfig,
}

impl HttpUploadService {
    pub fn new(config: HttpUploadConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    pub const fn config(&self) -> &HttpUploadConfig {
        &self.config
    }

    fn endpoint(&self, resource: ResourceType, action: &str) -> String {
        format!(
            "{}/{}/{}/{action}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            resource.as_str()
        )
    }

    /// Turn a non-2xx response into a rejection carrying the API's message
    async fn rejection(response: reqwest::Response) -> UploadError {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => UploadError::Rejected(body.error.message),
            Err(_) => UploadError::Rejected(format!("HTTP {status}")),
        }
    }
}

#[async_trait]
impl UploadService for HttpUploadService {
    async fn upload(
        &self,
        file: UploadFile,
        constraints: &UploadConstraints,
    ) -> Result<UploadedFile, UploadError> {
        constraints.check(&file)?;
        let fallback_format = file.format().unwrap_or_default();
        let size = file.size();

        let part = Part::bytes(file.data.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.mime())
            .map_err(|e| UploadError::Transfer(format!("invalid content type: {e}")))?;
        let form = Form::new()
            .text("upload_preset", self.config.upload_preset.clone())
            .part("file", part);

        let url = self.endpoint(constraints.resource_type, "upload");
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transfer(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Transfer(format!("Failed to read response: {e}")))?;

        tracing::info!(url = %body.secure_url, size, "file uploaded");
        Ok(UploadedFile {
            url: body.secure_url,
            size_bytes: body.bytes.unwrap_or(size),
            format: body.format.unwrap_or(fallback_format),
        })
    }

    async fn delete(&self, external_id: &str) -> Result<(), UploadError> {
        let (Some(api_key), Some(api_secret)) = (&self.config.api_key, &self.config.api_secret)
        else {
            return Err(UploadError::Rejected(
                "deleting hosted files requires an API key and secret".to_string(),
            ));
        };

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("public_id", external_id), ("timestamp", &timestamp)],
            api_secret,
        );
        let params = [
            ("public_id", external_id.to_string()),
            ("timestamp", timestamp),
            ("api_key", api_key.clone()),
            ("signature", signature),
            ("signature_algorithm", "sha256".to_string()),
        ];

        let response = self
            .client
            .post(self.endpoint(ResourceType::Image, "destroy"))
            .form(&params)
            .send()
            .await
            .map_err(|e| UploadError::Transfer(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body: DestroyResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Transfer(format!("Failed to read response: {e}")))?;
        match body.result.as_str() {
            "ok" => Ok(()),
            "not found" => Err(UploadError::NotFound(external_id.to_string())),
            other => Err(UploadError::Rejected(format!("unexpected destroy result: {other}"))),
        }
    }
}
