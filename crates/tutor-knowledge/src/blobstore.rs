use async_trait::async_trait;

use crate::error::Result;

/// Persists page-rendered images (used as citation evidence) and returns a
/// URL the gateway can hand back to a client. Swappable so tests and small
/// deployments can use a local directory while production points at object
/// storage, without touching the ingestion pipeline.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Writes page images under a base directory and returns a `file://` URL.
/// The default store for self-hosted deployments; swap in an S3-backed
/// implementation for anything serving citation images over the network.
pub struct FilesystemBlobStore {
    base_dir: std::path::PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        let path = self.base_dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| crate::error::KnowledgeError::BlobStore(e.to_string()))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| crate::error::KnowledgeError::BlobStore(e.to_string()))?;
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filesystem_store_writes_and_returns_a_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path());
        let url = store.put("doc-1/page-1.png", vec![1, 2, 3], "image/png").await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.contains("doc-1/page-1.png"));
    }
}
