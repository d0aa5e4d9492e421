//! Filesystem-persisted store
//!
//! One JSON document per key under a base directory. File names are the
//! blake3 hash of the key so arbitrary keys (e.g. video paths) are safe; the
//! original key is kept inside the document. Expiry is wall-clock based so it
//! survives restarts.

use crate::{validate_key, Store, StorageResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct Document<V> {
    key: String,
    value: V,
    /// Unix milliseconds
    expires_at_ms: Option<i64>,
}

impl<V> Document<V> {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }
}

/// Persistent JSON file store
pub struct FsStore<V> {
    base_dir: PathBuf,
    _value: PhantomData<fn() -> V>,
}

impl<V> FsStore<V> {
    /// Open a store rooted at `base_dir`, creating the directory if needed
    pub async fn open(base_dir: impl AsRef<Path>) -> StorageResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self {
            base_dir,
            _value: PhantomData,
        })
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = blake3::hash(key.as_bytes()).to_hex();
        self.base_dir.join(format!("{name}.{EXTENSION}"))
    }

    async fn document_paths(&self) -> StorageResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn read_document<V: DeserializeOwned>(path: &Path) -> StorageResult<Option<Document<V>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_if_present(path: &Path) -> StorageResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl<V> Store<V> for FsStore<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    async fn get(&self, key: &str) -> StorageResult<Option<V>> {
        validate_key(key)?;
        let document = read_document::<V>(&self.path_for(key)).await?;
        Ok(document
            .filter(|doc| doc.key == key && !doc.is_expired(now_ms()))
            .map(|doc| doc.value))
    }

    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> StorageResult<()> {
        validate_key(key)?;
        let expires_at_ms = ttl.map(|ttl| {
            now_ms().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
        });
        let document = Document {
            key: key.to_string(),
            value,
            expires_at_ms,
        };
        let bytes = serde_json::to_vec(&document)?;

        // Write-then-rename so readers never observe a partial document
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        remove_if_present(&self.path_for(key)).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        let now = now_ms();
        let mut keys = Vec::new();
        for path in self.document_paths().await? {
            match read_document::<V>(&path).await {
                Ok(Some(doc)) if !doc.is_expired(now) => keys.push(doc.key),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable store document {:?}: {}", path, e),
            }
        }
        Ok(keys)
    }

    async fn clear(&self) -> StorageResult<()> {
        for path in self.document_paths().await? {
            remove_if_present(&path).await?;
        }
        Ok(())
    }

    async fn purge_expired(&self) -> StorageResult<Vec<String>> {
        let now = now_ms();
        let mut purged = Vec::new();
        for path in self.document_paths().await? {
            match read_document::<V>(&path).await {
                Ok(Some(doc)) if doc.is_expired(now) => {
                    if remove_if_present(&path).await? {
                        purged.push(doc.key);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable store document {:?}: {}", path, e),
            }
        }
        Ok(purged)
    }
}
