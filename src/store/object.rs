//! Object Store Abstraction
//!
//! Trait-based abstraction over the five primitives the flush protocol
//! needs: put, stat, compose, copy, remove. There is deliberately no
//! append operation; the pipeline builds append semantics on top of
//! compose.
//!
//! Implementations:
//! - `InMemoryComposeStore`: for unit tests and embedding
//! - `LocalFsComposeStore`: for development and local testing
//! - `CloudComposeStore`: for production (feature-gated, `store::s3`)

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

/// Metadata for a stored object
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object key (path)
    pub key: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Creation timestamp (Unix ms)
    pub created_at_ms: u64,
}

/// Object store abstraction trait.
///
/// Every operation is independently fallible. A missing object is
/// reported as `ErrorKind::NotFound`; callers that treat absence as a
/// normal case (the daily-object probe) match on the kind.
pub trait ComposeStore: Send + Sync + 'static {
    /// Put an object (create or overwrite)
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>>;

    /// Get object metadata without downloading content
    fn stat<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ObjectMeta>> + Send + 'a>>;

    /// Server-side concatenation of existing objects into `dest`,
    /// in the order given. Fails with NotFound if any source is missing.
    fn compose<'a>(
        &'a self,
        sources: &'a [String],
        dest: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>>;

    /// Copy an object's content to another name (overwriting)
    fn copy<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>>;

    /// Delete an object. Idempotent: removing a missing key is Ok.
    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>>;
}

// ============================================================================
// InMemoryComposeStore - for tests and embedding
// ============================================================================

/// In-memory object store for unit tests and deterministic runs
#[derive(Debug)]
pub struct InMemoryComposeStore {
    data: Arc<RwLock<HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    created_at_ms: u64,
}

impl InMemoryComposeStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        InMemoryComposeStore {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as u64
    }

    /// Read an object's content directly (test introspection)
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().get(key).map(|obj| obj.data.clone())
    }

    /// All stored keys, sorted (test introspection)
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Default for InMemoryComposeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryComposeStore {
    fn clone(&self) -> Self {
        InMemoryComposeStore {
            data: Arc::clone(&self.data),
        }
    }
}

impl ComposeStore for InMemoryComposeStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let obj = StoredObject {
                data: data.to_vec(),
                created_at_ms: Self::now_ms(),
            };
            self.data.write().insert(key.to_string(), obj);
            Ok(())
        })
    }

    fn stat<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ObjectMeta>> + Send + 'a>> {
        Box::pin(async move {
            self.data
                .read()
                .get(key)
                .map(|obj| ObjectMeta {
                    key: key.to_string(),
                    size_bytes: obj.data.len() as u64,
                    created_at_ms: obj.created_at_ms,
                })
                .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("Key not found: {}", key)))
        })
    }

    fn compose<'a>(
        &'a self,
        sources: &'a [String],
        dest: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut composed = Vec::new();
            {
                let data = self.data.read();
                for src in sources {
                    let obj = data.get(src).ok_or_else(|| {
                        IoError::new(ErrorKind::NotFound, format!("Compose source not found: {}", src))
                    })?;
                    composed.extend_from_slice(&obj.data);
                }
            }
            self.data.write().insert(
                dest.to_string(),
                StoredObject {
                    data: composed,
                    created_at_ms: Self::now_ms(),
                },
            );
            Ok(())
        })
    }

    fn copy<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let src = self.data.read().get(from).cloned().ok_or_else(|| {
                IoError::new(ErrorKind::NotFound, format!("Copy source not found: {}", from))
            })?;
            self.data.write().insert(
                to.to_string(),
                StoredObject {
                    data: src.data,
                    created_at_ms: Self::now_ms(),
                },
            );
            Ok(())
        })
    }

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.data.write().remove(key);
            Ok(())
        })
    }
}

// ============================================================================
// LocalFsComposeStore - for development
// ============================================================================

/// Local filesystem object store for development and testing
#[derive(Debug, Clone)]
pub struct LocalFsComposeStore {
    base_path: PathBuf,
}

impl LocalFsComposeStore {
    /// Create a new local filesystem store rooted at `base_path`
    pub fn new(base_path: PathBuf) -> Self {
        LocalFsComposeStore { base_path }
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    fn ensure_parent(&self, path: &PathBuf) -> IoResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Get the base path (for testing)
    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }
}

impl ComposeStore for LocalFsComposeStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            self.ensure_parent(&path)?;
            tokio::fs::write(&path, data).await
        })
    }

    fn stat<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ObjectMeta>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            let metadata = tokio::fs::metadata(&path).await?;
            Ok(ObjectMeta {
                key: key.to_string(),
                size_bytes: metadata.len(),
                created_at_ms: metadata
                    .created()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as u64)
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
                let data = tokio::fs::read(self.full_path(src)).await?;
                composed.extend_from_slice(&data);
            }
            let dest_path = self.full_path(dest);
            self.ensure_parent(&dest_path)?;
            tokio::fs::write(&dest_path, composed).await
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
            self.ensure_parent(&to_path)?;
            tokio::fs::copy(&from_path, &to_path).await.map(|_| ())
        })
    }

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()), // Already deleted
                Err(e) => Err(e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmemory_put_stat() {
        let store = InMemoryComposeStore::new();

        store.put("T1/2025-01-01/data.jsonl", b"hello\n").await.unwrap();
        let meta = store.stat("T1/2025-01-01/data.jsonl").await.unwrap();

        assert_eq!(meta.size_bytes, 6);
        assert_eq!(meta.key, "T1/2025-01-01/data.jsonl");
    }

    #[tokio::test]
    async fn test_inmemory_stat_missing_is_not_found() {
        let store = InMemoryComposeStore::new();

        let err = store.stat("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_inmemory_compose_preserves_order() {
        let store = InMemoryComposeStore::new();

        store.put("daily", b"old line\n").await.unwrap();
        store.put("part", b"new line\n").await.unwrap();

        store
            .compose(&["daily".to_string(), "part".to_string()], "tmp")
            .await
            .unwrap();

        assert_eq!(store.object("tmp").unwrap(), b"old line\nnew line\n");
    }

    #[tokio::test]
    async fn test_inmemory_compose_missing_source() {
        let store = InMemoryComposeStore::new();

        store.put("daily", b"data").await.unwrap();
        let err = store
            .compose(&["daily".to_string(), "missing".to_string()], "tmp")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_inmemory_copy_overwrites() {
        let store = InMemoryComposeStore::new();

        store.put("src", b"fresh").await.unwrap();
        store.put("dst", b"stale").await.unwrap();
        store.copy("src", "dst").await.unwrap();

        assert_eq!(store.object("dst").unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_inmemory_remove_idempotent() {
        let store = InMemoryComposeStore::new();

        store.put("key", b"data").await.unwrap();
        store.remove("key").await.unwrap();
        store.remove("key").await.unwrap(); // No error on second remove
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_localfs_put_stat() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalFsComposeStore::new(dir.path().to_path_buf());

        store.put("T1/2025-01-01/data.jsonl", b"hello\n").await.unwrap();
        let meta = store.stat("T1/2025-01-01/data.jsonl").await.unwrap();
        assert_eq!(meta.size_bytes, 6);
    }

    #[tokio::test]
    async fn test_localfs_compose_copy_remove() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalFsComposeStore::new(dir.path().to_path_buf());

        store.put("a", b"one\n").await.unwrap();
        store.put("b", b"two\n").await.unwrap();
        store
            .compose(&["a".to_string(), "b".to_string()], "c")
            .await
            .unwrap();

        store.copy("c", "d").await.unwrap();
        let data = tokio::fs::read(store.base_path().join("d")).await.unwrap();
        assert_eq!(data, b"one\ntwo\n");

        store.remove("c").await.unwrap();
        store.remove("c").await.unwrap(); // Idempotent
        assert!(store.stat("c").await.is_err());
    }
}
