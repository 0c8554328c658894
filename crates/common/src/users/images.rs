//! Profile image hosting on the ImageKit upload API

use crate::config::ImageHostConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

const SERVICE: &str = "imagekit";

/// Stores an image and hands back its public URL
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// `data` is the base64 payload, with or without a `data:` prefix
    async fn upload_image(&self, data: &str, file_name: &str) -> Result<String>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    url: String,
    #[serde(default)]
    file_id: Option<String>,
}

pub struct ImageKitHost {
    client: reqwest::Client,
    private_key: String,
    upload_url: String,
    folder: String,
}

impl ImageKitHost {
    /// Build the host; `None` when no private key is configured
    pub fn from_config(config: &ImageHostConfig) -> Result<Option<Self>> {
        let Some(private_key) = &config.private_key else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Some(Self {
            client,
            private_key: private_key.clone(),
            upload_url: config.upload_url.clone(),
            folder: config.folder.clone(),
        }))
    }
}

#[async_trait]
impl ImageHost for ImageKitHost {
    async fn upload_image(&self, data: &str, file_name: &str) -> Result<String> {
        let form = Form::new()
            .text("file", data.to_string())
            .text("fileName", file_name.to_string())
            .text("folder", self.folder.clone())
            .text("useUniqueFileName", "true");

        let response = self
            .client
            .post(&self.upload_url)
            .basic_auth(&self.private_key, Some(""))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::external(SERVICE, format!("upload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external(SERVICE, format!("upload failed ({}): {}", status, body)));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::external(SERVICE, format!("invalid upload response: {}", e)))?;
        info!(file_id = ?uploaded.file_id, "Image uploaded");
        Ok(uploaded.url)
    }
}
