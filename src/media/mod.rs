//! Upload proxy: multipart fields are staged to local disk, then forwarded
//! to the external media host. The host is an opaque collaborator; any
//! failure to store comes back as `None` and handlers turn it into a 400,
//! never a 500.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::config::MediaConfig;
use crate::error::ApiError;

/// What the media host hands back for a stored file.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredMedia {
    pub url: String,
    /// Derived by the host for video content; absent for images.
    pub duration: Option<f64>,
}

#[derive(Clone)]
pub struct MediaClient {
    http: reqwest::Client,
    upload_url: String,
    api_key: String,
    staging_dir: PathBuf,
}

impl MediaClient {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            upload_url: config.upload_url.clone(),
            api_key: config.api_key.clone(),
            staging_dir: PathBuf::from(&config.staging_dir),
        }
    }

    /// Write one multipart field to the staging directory under a fresh
    /// name, keeping the original extension.
    pub async fn stage(
        &self,
        original_filename: Option<&str>,
        bytes: &[u8],
    ) -> Result<PathBuf, ApiError> {
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| {
                tracing::error!("failed to create staging dir: {}", e);
                ApiError::internal("File staging failed")
            })?;

        let extension = original_filename
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin");
        let path = self
            .staging_dir
            .join(format!("{}.{}", Uuid::new_v4(), extension));

        tokio::fs::write(&path, bytes).await.map_err(|e| {
            tracing::error!("failed to stage upload: {}", e);
            ApiError::internal("File staging failed")
        })?;
        Ok(path)
    }

    /// Forward a staged file to the media host. The staged file is removed
    /// in every outcome. `None` means the host rejected or the transfer
    /// failed; callers treat that as a recoverable client error.
    pub async fn store(&self, local_path: &Path) -> Option<StoredMedia> {
        let result = self.upload(local_path).await;
        if let Err(e) = tokio::fs::remove_file(local_path).await {
            warn!("failed to remove staged file {}: {}", local_path.display(), e);
        }
        match result {
            Ok(media) => Some(media),
            Err(e) => {
                warn!("media upload failed for {}: {}", local_path.display(), e);
                None
            }
        }
    }

    async fn upload(&self, local_path: &Path) -> anyhow::Result<StoredMedia> {
        let bytes = tokio::fs::read(local_path).await?;
        let filename = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(filename));

        let response = self
            .http
            .post(&self.upload_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<StoredMedia>().await?)
    }
}
