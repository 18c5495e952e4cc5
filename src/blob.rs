//! Blob storage for uploaded files.
//!
//! Two backends share the [`BlobStore`] trait: Vercel Blob over its HTTP
//! API, and a local directory whose contents the app serves under `/blobs`.

use async_trait::async_trait;
use axum::body::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const VERCEL_API_VERSION: &str = "7";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("delete failed: {0}")]
    DeleteFailed(String),

    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Location of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub pathname: String,
    pub url: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `data` under `pathname` and returns its public URL.
    async fn put(&self, pathname: &str, content_type: &str, data: Bytes) -> Result<StoredBlob, BlobError>;

    async fn delete(&self, url: &str) -> Result<(), BlobError>;

    /// Filesystem path for blobs this process serves itself.
    fn local_path(&self, _key: &str) -> Option<PathBuf> {
        None
    }
}

/// Rejects keys that could escape the storage root.
pub fn validate_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    let escapes = Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes || key.contains("..") {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Percent-encodes each segment of `key` so it can sit in a URL path.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub async fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Result<Self, BlobError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            base_url: format!("{}/blobs", public_base_url.trim_end_matches('/')),
        })
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        let encoded = url.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        urlencoding::decode(encoded).ok().map(|key| key.into_owned())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, pathname: &str, _content_type: &str, data: Bytes) -> Result<StoredBlob, BlobError> {
        validate_key(pathname)?;
        let path = self.root.join(pathname);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "blob written");
        Ok(StoredBlob {
            pathname: pathname.to_string(),
            url: format!("{}/{}", self.base_url, encode_key(pathname)),
        })
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let key = self
            .key_from_url(url)
            .ok_or_else(|| BlobError::DeleteFailed(format!("{url} is not a local blob")))?;
        validate_key(&key)?;
        match fs::remove_file(self.root.join(&key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        validate_key(key).ok()?;
        Some(self.root.join(key))
    }
}

#[derive(Debug, Deserialize)]
struct VercelPutResponse {
    url: String,
    pathname: String,
}

/// Vercel Blob client authenticated with a read/write token.
#[derive(Clone)]
pub struct VercelBlobStore {
    client: reqwest::Client,
    token: String,
    api_url: String,
}

impl VercelBlobStore {
    pub fn new(token: String, api_url: String) -> Result<Self, BlobError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            token,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for VercelBlobStore {
    async fn put(&self, pathname: &str, content_type: &str, data: Bytes) -> Result<StoredBlob, BlobError> {
        validate_key(pathname)?;
        let response = self
            .client
            .put(format!("{}/{}", self.api_url, encode_key(pathname)))
            .bearer_auth(&self.token)
            .header("x-api-version", VERCEL_API_VERSION)
            .header("x-content-type", content_type)
            .header("x-add-random-suffix", "0")
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BlobError::UploadFailed(format!("{status}: {body}")));
        }
        let stored: VercelPutResponse = response.json().await?;
        tracing::debug!(url = %stored.url, "blob uploaded");
        Ok(StoredBlob {
            pathname: stored.pathname,
            url: stored.url,
        })
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let response = self
            .client
            .post(format!("{}/delete", self.api_url))
            .bearer_auth(&self.token)
            .header("x-api-version", VERCEL_API_VERSION)
            .json(&json!({ "urls": [url] }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BlobError::DeleteFailed(format!("{status}: {body}")));
        }
        Ok(())
    }
}
