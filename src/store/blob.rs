//! Attachment archive: blob stores keyed `{correlationId}/{filename}`.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channels::email_types::Attachment;
use crate::error::StoreError;
use crate::pipeline::types::CorrelationId;

/// Write-only object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;
}

/// Build the archive key for one attachment.
pub fn blob_key(correlation_id: &CorrelationId, name: &str) -> String {
    format!("{correlation_id}/{name}")
}

/// A pending upload; resolves to the stored key.
pub type UploadHandle = JoinHandle<Result<String, StoreError>>;

/// Start one upload task per attachment without waiting for any of them.
///
/// The caller owns the handles and must join them before it finishes with
/// the message.
pub fn archive_attachments(
    store: Arc<dyn BlobStore>,
    correlation_id: &CorrelationId,
    attachments: &[Attachment],
) -> Vec<UploadHandle> {
    attachments
        .iter()
        .map(|attachment| {
            let store = Arc::clone(&store);
            let key = blob_key(correlation_id, attachment.storage_name());
            let bytes = attachment.content.clone();
            tokio::spawn(async move {
                let size = bytes.len();
                store.put(&key, bytes).await?;
                debug!(key = %key, size, "Archived attachment");
                Ok(key)
            })
        })
        .collect()
}

// ── HTTP store ──────────────────────────────────────────────────────

/// Object store reached with `PUT {endpoint}/{key}` (R2/S3 gateways, MinIO
/// behind a signing proxy, etc.).
pub struct HttpBlobStore {
    endpoint: reqwest::Url,
    token: Option<SecretString>,
    client: reqwest::Client,
}

impl HttpBlobStore {
    pub fn new(endpoint: &str, token: Option<SecretString>) -> Result<Self, StoreError> {
        let endpoint = reqwest::Url::parse(endpoint).map_err(|e| StoreError::Request {
            store: "blob".into(),
            reason: format!("invalid endpoint {endpoint}: {e}"),
        })?;
        Ok(Self {
            endpoint,
            token,
            client: reqwest::Client::new(),
        })
    }

    /// Endpoint with each key segment appended and percent-encoded.
    pub(crate) fn object_url(&self, key: &str) -> Result<reqwest::Url, StoreError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::InvalidKey(format!("endpoint cannot hold {key}")))?;
            segments.pop_if_empty();
            for segment in key.split('/') {
                segments.push(segment);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let url = self.object_url(key)?;
        let mut request = self.client.put(url).body(bytes);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| StoreError::Request {
            store: "blob".into(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                store: "blob".into(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

// ── Local directory store ───────────────────────────────────────────

/// Stores objects as files under a root directory.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a key under the root, refusing anything that would escape it.
    pub(crate) fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(())
    }
}
