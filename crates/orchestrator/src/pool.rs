//! Ready pool of generated frames

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use frame_randomizer_common::{FrameId, PoolEmptyError, StoredAnswer};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A generated frame waiting to be served
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSlot {
    pub frame_id: FrameId,
    pub image_path: PathBuf,
    pub answer: StoredAnswer,
    /// Past this instant the slot is swept instead of served
    pub expires_at: Instant,
}

impl PoolSlot {
    #[must_use]
    pub fn new(
        frame_id: FrameId,
        image_path: PathBuf,
        answer: StoredAnswer,
        ttl: Duration,
    ) -> Self {
        Self {
            frame_id,
            image_path,
            answer,
            expires_at: Instant::now() + ttl,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    /// Time until the slot expires, zero once it has
    #[must_use]
    pub fn time_left(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// FIFO of ready slots with a target size
#[derive(Debug)]
pub struct FramePool {
    slots: Mutex<VecDeque<PoolSlot>>,
    target: usize,
}

impl FramePool {
    #[must_use]
    pub fn new(target: usize) -> Self {
        Self {
            slots: Mutex::new(VecDeque::with_capacity(target)),
            target,
        }
    }

    /// Configured number of ready slots
    #[must_use]
    pub fn target(&self) -> usize {
        self.target
    }

    pub async fn push(&self, slot: PoolSlot) {
        self.slots.lock().await.push_back(slot);
    }

    /// Remove and return the oldest live slot.
    ///
    /// Expired slots are skipped and left for the sweeper.
    pub async fn take(&self) -> Result<PoolSlot, PoolEmptyError> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        let index = slots
            .iter()
            .position(|slot| !slot.is_expired(now))
            .ok_or(PoolEmptyError)?;
        slots.remove(index).ok_or(PoolEmptyError)
    }

    /// Remove a slot by frame id
    pub async fn remove(&self, frame_id: &str) -> Option<PoolSlot> {
        let mut slots = self.slots.lock().await;
        let index = slots.iter().position(|slot| slot.frame_id == frame_id)?;
        slots.remove(index)
    }

    pub async fn contains(&self, frame_id: &str) -> bool {
        self.slots
            .lock()
            .await
            .iter()
            .any(|slot| slot.frame_id == frame_id)
    }

    /// Remove and return every slot past its expiry
    pub async fn remove_expired(&self) -> Vec<PoolSlot> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        let (expired, live): (Vec<_>, Vec<_>) =
            slots.drain(..).partition(|slot| slot.is_expired(now));
        slots.extend(live);
        expired
    }

    /// Live (servable) slots
    pub async fn ready(&self) -> usize {
        let now = Instant::now();
        self.slots
            .lock()
            .await
            .iter()
            .filter(|slot| !slot.is_expired(now))
            .count()
    }

    /// All slots, expired ones included
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}
