//! S3-Compatible Object Store Implementation
//!
//! Production backend over the `object_store` crate from the Arrow
//! ecosystem. Supports AWS S3 and S3-compatible services (MinIO,
//! LocalStack) via a custom endpoint.
//!
//! The S3 API has no server-side concatenation, so `compose` falls
//! back to read-and-rewrite: fetch each source, concatenate client
//! side, put the destination. The flush protocol above it is unchanged.

use crate::config::S3Config;
use crate::store::object::{ComposeStore, ObjectMeta};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore as ObjectStoreTrait;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::pin::Pin;
use std::sync::Arc;

/// S3-compatible object store for production deployments
#[derive(Clone)]
pub struct CloudComposeStore {
    store: Arc<dyn ObjectStoreTrait>,
    prefix: String,
}

impl CloudComposeStore {
    /// Create a new cloud store.
    ///
    /// Credentials come from the environment:
    /// - AWS_ACCESS_KEY_ID
    /// - AWS_SECRET_ACCESS_KEY
    /// - AWS_REGION (or uses config.region)
    /// - AWS_ENDPOINT (or uses config.endpoint for MinIO)
    pub fn new(config: &S3Config) -> IoResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);

        // Custom endpoint for S3-compatible services (MinIO)
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        builder = builder
            .with_access_key_id(std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default())
            .with_secret_access_key(std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default());

        let store = builder.build().map_err(|e| {
            IoError::new(
                ErrorKind::InvalidInput,
                format!("Failed to create S3 store: {}", e),
            )
        })?;

        Ok(CloudComposeStore {
            store: Arc::new(store),
            prefix: config.prefix.clone(),
        })
    }

    /// Create from an existing object store (for testing)
    pub fn from_store(store: Arc<dyn ObjectStoreTrait>, prefix: String) -> Self {
        CloudComposeStore { store, prefix }
    }

    fn full_path(&self, key: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{}", self.prefix, key))
        }
    }

    /// Convert object_store errors to IoError
    fn map_error(err: object_store::Error) -> IoError {
        match &err {
            object_store::Error::NotFound { .. } => {
                IoError::new(ErrorKind::NotFound, err.to_string())
            }
            object_store::Error::AlreadyExists { .. } => {
                IoError::new(ErrorKind::AlreadyExists, err.to_string())
            }
            object_store::Error::Precondition { .. } => {
                IoError::new(ErrorKind::InvalidInput, err.to_string())
            }
            _ => IoError::new(ErrorKind::Other, err.to_string()),
        }
    }
}

impl std::fmt::Debug for CloudComposeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudComposeStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ComposeStore for CloudComposeStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            self.store
                .put(&path, bytes::Bytes::copy_from_slice(data).into())
                .await
                .map_err(Self::map_error)?;
            Ok(())
        })
    }

    fn stat<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ObjectMeta>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            let meta = self.store.head(&path).await.map_err(Self::map_error)?;

            Ok(ObjectMeta {
                key: key.to_string(),
                size_bytes: meta.size as u64,
                created_at_ms: meta
                    .last_modified
                    .timestamp_millis()
                    .try_into()
                    .unwrap_or(0),
            })
        })
    }

    fn compose<'a>(
        &'a self,
        sources: &'a [String],
        dest: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut composed = Vec::new();
            for src in sources {
                let path = self.full_path(src);
                let result = self.store.get(&path).await.map_err(Self::map_error)?;
                let data = result.bytes().await.map_err(Self::map_error)?;
                composed.extend_from_slice(&data);
            }
            let dest_path = self.full_path(dest);
            self.store
                .put(&dest_path, bytes::Bytes::from(composed).into())
                .await
                .map_err(Self::map_error)?;
            Ok(())
        })
    }

    fn copy<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let from_path = self.full_path(from);
            let to_path = self.full_path(to);
            self.store
                .copy(&from_path, &to_path)
                .await
                .map_err(Self::map_error)?;
            Ok(())
        })
    }

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            // S3 delete is idempotent - ignore not found errors
            match self.store.delete(&path).await {
                Ok(()) => Ok(()),
                Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(Self::map_error(e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_path_with_prefix() {
        let store = CloudComposeStore::from_store(
            Arc::new(object_store::memory::InMemory::new()),
            "truck-telemetry".to_string(),
        );

        assert_eq!(
            store.full_path("T1/2025-01-01/data.jsonl").to_string(),
            "truck-telemetry/T1/2025-01-01/data.jsonl"
        );
    }

    #[test]
    fn test_full_path_without_prefix() {
        let store = CloudComposeStore::from_store(
            Arc::new(object_store::memory::InMemory::new()),
            String::new(),
        );

        assert_eq!(
            store.full_path("T1/2025-01-01/data.jsonl").to_string(),
            "T1/2025-01-01/data.jsonl"
        );
    }

    #[tokio::test]
    async fn test_compose_against_memory_backend() {
        let store = CloudComposeStore::from_store(
            Arc::new(object_store::memory::InMemory::new()),
            "pfx".to_string(),
        );

        store.put("daily", b"old\n").await.unwrap();
        store.put("part", b"new\n").await.unwrap();
        store
            .compose(&["daily".to_string(), "part".to_string()], "tmp")
            .await
            .unwrap();
        store.copy("tmp", "daily").await.unwrap();

        let meta = store.stat("daily").await.unwrap();
        assert_eq!(meta.size_bytes, 8);

        store.remove("tmp").await.unwrap();
        store.remove("tmp").await.unwrap(); // Idempotent
        assert_eq!(
            store.stat("tmp").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
