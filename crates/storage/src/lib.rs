//! Keyed storage backends for frame generation
//!
//! Three independent stores back the service:
//! - **Answers**: frame id -> season/episode, in memory, TTL per item
//! - **Frame state**: frame id -> image file, in memory, TTL per item
//! - **Probe cache**: video path -> duration, persisted on the filesystem
//!
//! All of them speak the same [`Store`] interface so the service can be wired
//! with any backend, including test doubles.
//!
//! # Example
//!
//! ```rust,no_run
//! use frame_randomizer_storage::{MemoryStore, Store};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store: MemoryStore<u32> = MemoryStore::new();
//!     store.set("answer", 42, Some(Duration::from_secs(60))).await?;
//!     assert_eq!(store.get("answer").await?, Some(42));
//!     Ok(())
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

pub mod fs_store;
pub mod memory_store;

pub use fs_store::FsStore;
pub use memory_store::MemoryStore;

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Keyed store with optional per-item expiry.
///
/// Operations are atomic per key only; there are no cross-key transactions.
/// Expired items are never returned by `get` or `keys`, whether or not they
/// have been purged yet.
#[async_trait::async_trait]
pub trait Store<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Fetch a live item
    async fn get(&self, key: &str) -> StorageResult<Option<V>>;

    /// Insert or overwrite an item. `None` means it never expires.
    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> StorageResult<()>;

    /// Remove an item. Returns whether a live item was present.
    async fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Keys of all live items
    async fn keys(&self) -> StorageResult<Vec<String>>;

    /// Remove everything
    async fn clear(&self) -> StorageResult<()>;

    /// Drop expired items and return their keys
    async fn purge_expired(&self) -> StorageResult<Vec<String>>;
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("abc").is_ok());
        assert!(validate_key("/videos/S01E01.mkv").is_ok());
        assert!(matches!(
            validate_key(""),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_serde_error_conversion() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let storage_err: StorageError = err.into();
        assert!(matches!(storage_err, StorageError::Serialization(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let storage_err: StorageError = err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
        assert_eq!(storage_err.to_string(), "IO error: denied");
    }
}
