//! Answer store: frame id -> ground truth, with expiry
//!
//! Backend errors are logged and read as a miss. Removing an answer never
//! touches the frame image; the two expire independently.

use std::sync::Arc;
use std::time::Duration;

use frame_randomizer_common::StoredAnswer;
use frame_randomizer_storage::{MemoryStore, Store};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AnswerStore {
    store: Arc<dyn Store<StoredAnswer>>,
    ttl: Duration,
}

impl AnswerStore {
    pub fn new(store: Arc<dyn Store<StoredAnswer>>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// In-memory answer store
    #[must_use]
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), ttl)
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `answer` under `frame_id`, restarting its expiry
    pub async fn set(&self, frame_id: &str, answer: StoredAnswer) {
        if let Err(e) = self.store.set(frame_id, answer, Some(self.ttl)).await {
            warn!("Failed to store answer for {}: {}", frame_id, e);
        }
    }

    pub async fn get(&self, frame_id: &str) -> Option<StoredAnswer> {
        match self.store.get(frame_id).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Failed to read answer for {}: {}", frame_id, e);
                None
            }
        }
    }

    /// Returns whether a live answer was removed
    pub async fn remove(&self, frame_id: &str) -> bool {
        match self.store.remove(frame_id).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Failed to remove answer for {}: {}", frame_id, e);
                false
            }
        }
    }

    /// Read an answer once. Removal runs in the background; the caller does
    /// not wait for it.
    pub async fn view_once(&self, frame_id: &str) -> Option<StoredAnswer> {
        let answer = self.get(frame_id).await?;
        let answers = self.clone();
        let frame_id = frame_id.to_string();
        tokio::spawn(async move {
            answers.remove(&frame_id).await;
            debug!("Cleaned up stored answer {}", frame_id);
        });
        Some(answer)
    }

    /// Drop expired answers and return their frame ids
    pub async fn purge_expired(&self) -> Vec<String> {
        match self.store.purge_expired().await {
            Ok(expired) => expired,
            Err(e) => {
                warn!("Failed to purge expired answers: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear answers: {}", e);
        }
    }
}
