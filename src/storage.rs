use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;

use crate::config::StorageConfig;

/// Object storage for uploaded profile images.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
}

pub async fn from_config(cfg: &StorageConfig) -> anyhow::Result<Arc<dyn StorageClient>> {
    Ok(match cfg {
        StorageConfig::S3 {
            endpoint,
            bucket,
            access_key,
            secret_key,
            region,
        } => Arc::new(Storage::new(endpoint, bucket, access_key, secret_key, region).await?)
            as Arc<dyn StorageClient>,
        StorageConfig::Local { root } => Arc::new(LocalStorage::new(root.clone())),
    })
}

/// S3/MinIO bucket.
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }
}

/// Files under a local directory, used when no bucket is configured.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(key);
        anyhow::ensure!(
            rel.components().all(|c| matches!(c, Component::Normal(_))),
            "invalid object key {key:?}"
        );
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("remove {}", path.display()))?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_storage_writes_and_removes_files() {
        let root = std::env::temp_dir().join(format!("userbase-test-{}", uuid::Uuid::new_v4()));
        let st = LocalStorage::new(root.clone());

        st.put_object("users/a.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(root.join("users/a.png")).await.unwrap(), b"png");

        st.delete_object("users/a.png").await.unwrap();
        assert!(!root.join("users/a.png").exists());
        assert!(st.delete_object("users/a.png").await.is_err());

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn local_storage_rejects_escaping_keys() {
        let st = LocalStorage::new(std::env::temp_dir());
        assert!(st
            .put_object("../evil", Bytes::new(), "image/png")
            .await
            .is_err());
        assert!(st.delete_object("/etc/passwd").await.is_err());
    }
}
