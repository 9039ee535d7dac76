//! Content-addressed evidence image storage on the local filesystem

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::StoreConfig;
use crate::models::UploadResult;
use crate::services::ImageStorage;
use crate::transport::{ensure_success, TransportClient};
use crate::utils::error::StoreError;

/// Stores downloaded images under their SHA-256 digest
///
/// The directory is expected to be served at `public_base_url`.
pub struct LocalImageStorage {
    transport: TransportClient,
    dir: PathBuf,
    public_base_url: String,
}

impl LocalImageStorage {
    pub fn new(
        transport: TransportClient,
        dir: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            dir: dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(transport: TransportClient, config: &StoreConfig) -> Self {
        Self::new(transport, &config.image_dir, &config.public_base_url)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download and persist one image, returning its storage key
    async fn store(&self, source_url: &str) -> Result<String, StoreError> {
        let response = self
            .transport
            .fetch(source_url, &self.transport.options())
            .await?;
        let response = ensure_success(source_url, response)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = response
            .bytes()
            .await
            .map_err(crate::utils::error::TransportError::from)?;

        if bytes.is_empty() {
            return Err(StoreError::Corrupt(format!("empty image body from {source_url}")));
        }

        let key = format!(
            "{}.{}",
            content_key(&bytes),
            extension(content_type.as_deref(), source_url)
        );
        let path = self.dir.join(&key);

        if tokio::fs::try_exists(&path).await? {
            tracing::debug!(key = %key, "Image already stored");
            return Ok(key);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, &bytes).await?;

        Ok(key)
    }
}

#[async_trait]
impl ImageStorage for LocalImageStorage {
    async fn upload_image(&self, source_url: &str, key_hint: &str) -> UploadResult {
        match self.store(source_url).await {
            Ok(key) => {
                let public_url = format!("{}/{}", self.public_base_url, key);
                tracing::info!(item = key_hint, source_url, public_url = %public_url, "Image stored");
                UploadResult::uploaded(public_url)
            }
            Err(e) => {
                tracing::warn!(item = key_hint, source_url, error = %e, "Image upload failed");
                UploadResult::failed(e.to_string())
            }
        }
    }
}

/// Hex SHA-256 digest of the image bytes
pub fn content_key(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// File extension from the content type, then the URL path, defaulting to jpg
fn extension(content_type: Option<&str>, source_url: &str) -> &'static str {
    let from_mime = content_type.and_then(|ct| {
        match ct.split(';').next().unwrap_or_default().trim() {
            "image/jpeg" | "image/jpg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/webp" => Some("webp"),
            "image/gif" => Some("gif"),
            _ => None,
        }
    });
    if let Some(ext) = from_mime {
        return ext;
    }

    let path_ext = url::Url::parse(source_url)
        .ok()
        .and_then(|u| {
            u.path()
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
        });

    match path_ext.as_deref() {
        Some("png") => "png",
        Some("webp") => "webp",
        Some("gif") => "gif",
        _ => "jpg",
    }
}
