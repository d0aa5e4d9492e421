//! Frame Randomizer Orchestrator
//!
//! Owns the generation pipeline end to end: the episode index, the attempt
//! controller, the ready pool and the stores that track answers and frame
//! files. Pipelines run as detached tasks and cannot be cancelled once
//! started; the cleanup sweeper reconciles whatever they leave behind.
//!
//! ```text
//! start ──► seed N pipelines ──► pool ──► take_ready ──► serve
//!                 ▲                           │
//!                 └──── one replacement ◄─────┘
//! ```

pub mod answers;
pub mod attempt;
pub mod pool;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use frame_randomizer_common::{
    episode_name, EpisodeRecord, FrameConfig, FrameFileState, FrameId, IndexError,
    PoolEmptyError, ProbeCacheEntry,
};
use frame_randomizer_extractor::{discard, FrameExtractor};
use frame_randomizer_ingestion::{
    build_index, load_show_data, FfprobeProber, IndexOptions, ProbeCache,
};
use frame_randomizer_storage::{FsStore, MemoryStore, StorageError, Store};
use rand::Rng;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub use answers::AnswerStore;
pub use attempt::{
    AttemptController, FrameTask, GeneratedFrame, GenerationError, InFlightFrames, TaskState,
};
pub use pool::{FramePool, PoolSlot};
pub use sweeper::SweepReport;

/// Errors that prevent the service from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("No episodes available to generate frames from")]
    NoEpisodes,
}

/// Errors returned by [`FrameRandomizer::check`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("Missing id param")]
    MissingId,

    #[error("Answer not found for id {0:?}")]
    NotFound(FrameId),
}

/// A frame handed out to a player
#[derive(Debug, Clone, PartialEq)]
pub struct ServedFrame {
    pub frame_id: FrameId,
    pub image_path: PathBuf,
}

/// Outcome of a guess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub season: u32,
    pub episode: u32,
    pub name: String,
    pub overview: String,
    pub correct: bool,
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub target: usize,
    pub ready: usize,
    pub generating: usize,
    pub active_attempts: usize,
}

/// Everything the service needs, assembled by [`ServiceParts::from_config`]
/// or by hand in tests
pub struct ServiceParts {
    pub episodes: Vec<EpisodeRecord>,
    pub controller: AttemptController,
    pub answers: AnswerStore,
    pub frame_states: Arc<dyn Store<FrameFileState>>,
    pub pool_size: usize,
    /// Frame-state TTL once a frame has been served
    pub frame_expiry: Duration,
    /// Lifetime of a ready slot that nobody takes
    pub unserved_frame_expiry: Duration,
    /// `None` runs no background sweeper; call [`FrameRandomizer::sweep_now`]
    pub cleanup_interval: Option<Duration>,
}

impl ServiceParts {
    /// In-memory stores and ffmpeg/identify tools wired from configuration
    #[must_use]
    pub fn from_config(config: &FrameConfig, episodes: Vec<EpisodeRecord>) -> Self {
        let extractor = FrameExtractor::from_config(config);
        Self {
            episodes,
            controller: AttemptController::from_config(config, extractor),
            answers: AnswerStore::in_memory(config.answer_expiry()),
            frame_states: Arc::new(MemoryStore::new()),
            pool_size: config.frame_pregen_count,
            frame_expiry: config.frame_expiry(),
            unserved_frame_expiry: config.unserved_frame_expiry(),
            cleanup_interval: Some(config.cleanup_interval()),
        }
    }
}

pub(crate) struct Inner {
    pub(crate) episodes: Vec<EpisodeRecord>,
    pub(crate) controller: AttemptController,
    pub(crate) answers: AnswerStore,
    pub(crate) frame_states: Arc<dyn Store<FrameFileState>>,
    pub(crate) pool: FramePool,
    pub(crate) in_flight: Arc<InFlightFrames>,
    pub(crate) frame_expiry: Duration,
    pub(crate) unserved_frame_expiry: Duration,
}

/// The frame generation service
pub struct FrameRandomizer {
    inner: Arc<Inner>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FrameRandomizer {
    /// Build the index from configuration and start serving.
    ///
    /// Index errors are fatal unless `allow_missing_episodes` is set.
    pub async fn start(config: &FrameConfig) -> Result<Self, StartupError> {
        info!("Loading show data from {:?}", config.show_data_path);
        let show = load_show_data(&config.show_data_path).await?;

        let cache: Option<Arc<dyn Store<ProbeCacheEntry>>> = if config.use_ffprobe_cache {
            Some(Arc::new(
                FsStore::<ProbeCacheEntry>::open(&config.ffprobe_cache_dir).await?,
            ))
        } else {
            None
        };
        let probes = ProbeCache::new(
            Arc::new(FfprobeProber::new(
                &config.ffprobe_path,
                config.subprocess_timeout(),
            )),
            cache,
            config.probe_limit(),
        );

        let episodes = build_index(&show, &IndexOptions::from_config(config), &probes).await?;
        info!("Indexed {} episodes", episodes.len());

        Self::with_parts(ServiceParts::from_config(config, episodes)).await
    }

    /// Start from pre-built parts.
    ///
    /// Leftover frames from a previous run are deleted and all frame state is
    /// reset before the pool is seeded.
    pub async fn with_parts(parts: ServiceParts) -> Result<Self, StartupError> {
        if parts.episodes.is_empty() {
            return Err(StartupError::NoEpisodes);
        }

        parts.frame_states.clear().await?;
        parts.answers.clear().await;
        let extractor = parts.controller.extractor();
        let removed = clear_output_dir(&extractor.output_dir, &extractor.extension).await;
        if removed > 0 {
            info!(
                "Removed {} stale frames from {:?}",
                removed, extractor.output_dir
            );
        }

        let inner = Arc::new(Inner {
            episodes: parts.episodes,
            controller: parts.controller,
            answers: parts.answers,
            frame_states: parts.frame_states,
            pool: FramePool::new(parts.pool_size),
            in_flight: Arc::new(InFlightFrames::new()),
            frame_expiry: parts.frame_expiry,
            unserved_frame_expiry: parts.unserved_frame_expiry,
        });

        info!(
            "Seeding pool with {} frames from {} episodes",
            parts.pool_size,
            inner.episodes.len()
        );
        for _ in 0..parts.pool_size {
            inner.spawn_pipeline();
        }

        let sweeper = parts
            .cleanup_interval
            .map(|period| sweeper::spawn(Arc::downgrade(&inner), period));

        Ok(Self {
            inner,
            sweeper: Mutex::new(sweeper),
        })
    }

    /// Stop the sweeper. Running pipelines finish on their own.
    pub fn shutdown(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Frame randomizer shut down");
        }
    }

    /// Serve one ready frame and start exactly one replacement pipeline.
    ///
    /// The served frame's file now lives for `frame_expiry` and its answer
    /// gets a fresh TTL.
    pub async fn take_ready(&self) -> Result<ServedFrame, PoolEmptyError> {
        let slot = match self.inner.pool.take().await {
            Ok(slot) => slot,
            Err(e) => {
                // Pipelines that failed outright leave the pool short
                self.inner.top_up().await;
                return Err(e);
            }
        };
        self.inner.spawn_pipeline();

        let state = FrameFileState {
            path: slot.image_path.clone(),
        };
        if let Err(e) = self
            .inner
            .frame_states
            .set(&slot.frame_id, state, Some(self.inner.frame_expiry))
            .await
        {
            warn!("Failed to mark frame {} as served: {}", slot.frame_id, e);
        }
        self.inner.answers.set(&slot.frame_id, slot.answer).await;

        debug!("Serving frame {}", slot.frame_id);
        Ok(ServedFrame {
            frame_id: slot.frame_id,
            image_path: slot.image_path,
        })
    }

    /// Check a guess against the stored answer.
    ///
    /// The answer is viewable once: it is removed along with the frame file in
    /// the background. A missing guess is never correct.
    pub async fn check(
        &self,
        frame_id: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<CheckResult, CheckError> {
        if frame_id.trim().is_empty() {
            return Err(CheckError::MissingId);
        }
        let answer = self
            .inner
            .answers
            .view_once(frame_id)
            .await
            .ok_or_else(|| CheckError::NotFound(frame_id.to_string()))?;

        let inner = Arc::clone(&self.inner);
        let id = frame_id.to_string();
        tokio::spawn(async move { inner.forget_frame(&id).await });

        let record = self.inner.episode(answer.season, answer.episode);
        Ok(CheckResult {
            season: answer.season,
            episode: answer.episode,
            name: record.map(|r| r.name.clone()).unwrap_or_default(),
            overview: record.map(|r| r.overview.clone()).unwrap_or_default(),
            correct: season == Some(answer.season) && episode == Some(answer.episode),
        })
    }

    /// Image of a served, unexpired frame
    pub async fn frame_path(&self, frame_id: &str) -> Option<PathBuf> {
        if frame_id.is_empty() || self.inner.pool.contains(frame_id).await {
            return None;
        }
        match self.inner.frame_states.get(frame_id).await {
            Ok(state) => state.map(|s| s.path),
            Err(e) => {
                warn!("Failed to read frame state for {}: {}", frame_id, e);
                None
            }
        }
    }

    /// The episode index, sorted by season and episode
    #[must_use]
    pub fn episodes(&self) -> &[EpisodeRecord] {
        &self.inner.episodes
    }

    pub async fn status(&self) -> PoolStatus {
        PoolStatus {
            target: self.inner.pool.target(),
            ready: self.inner.pool.ready().await,
            generating: self.inner.in_flight.len(),
            active_attempts: self.inner.controller.in_flight(),
        }
    }

    /// Run one cleanup sweep now
    pub async fn sweep_now(&self) -> SweepReport {
        self.inner.sweep().await
    }
}

impl Drop for FrameRandomizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    pub(crate) fn episode(&self, season: u32, episode: u32) -> Option<&EpisodeRecord> {
        self.episodes
            .iter()
            .find(|r| r.season == season && r.episode == episode)
    }

    fn random_episode(&self) -> Option<&EpisodeRecord> {
        if self.episodes.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..self.episodes.len());
        self.episodes.get(index)
    }

    /// Launch one detached generation pipeline. The frame id counts as in
    /// flight from this call until the slot is in the pool.
    pub(crate) fn spawn_pipeline(self: &Arc<Self>) {
        let frame_id = uuid::Uuid::new_v4().to_string();
        let guard = self.in_flight.register(&frame_id);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.generate(frame_id).await;
            drop(guard);
        });
    }

    async fn generate(&self, frame_id: FrameId) {
        let Some(episode) = self.random_episode() else {
            return;
        };

        let frame = match self.controller.run(frame_id.clone(), episode).await {
            Ok(frame) => frame,
            Err(e) => {
                error!("Frame generation for {} failed: {}", episode.tag(), e);
                return;
            }
        };

        let answer = episode.answer();
        self.answers.set(&frame_id, answer).await;

        let slot = PoolSlot::new(
            frame_id.clone(),
            frame.image_path.clone(),
            answer,
            self.unserved_frame_expiry,
        );
        // The state must not expire before the slot, or a sweep would take
        // the file of a servable slot for an orphan
        let state = FrameFileState {
            path: frame.image_path.clone(),
        };
        if let Err(e) = self
            .frame_states
            .set(&frame_id, state, Some(slot.time_left(Instant::now())))
            .await
        {
            error!("Failed to record frame {}: {}", frame_id, e);
            discard(&frame.image_path).await;
            self.answers.remove(&frame_id).await;
            return;
        }

        self.pool.push(slot).await;
        info!(
            "Frame {} ready from {} ({:?}, {} attempts, score {:.1})",
            frame_id,
            episode_name(episode.season, episode.episode, &episode.name),
            frame.state,
            frame.attempts,
            frame.quality_score
        );
    }

    /// Start pipelines until ready plus generating reaches the target.
    /// Returns how many were started.
    pub(crate) async fn top_up(self: &Arc<Self>) -> usize {
        let have = self.pool.ready().await + self.in_flight.len();
        let missing = self.pool.target().saturating_sub(have);
        for _ in 0..missing {
            self.spawn_pipeline();
        }
        if missing > 0 {
            info!("Pool short by {}, started replacement pipelines", missing);
        }
        missing
    }

    /// Delete a frame's image and its frame-state entry
    pub(crate) async fn forget_frame(&self, frame_id: &str) {
        match self.frame_states.get(frame_id).await {
            Ok(Some(state)) => discard(&state.path).await,
            Ok(None) => {}
            Err(e) => warn!("Failed to read frame state for {}: {}", frame_id, e),
        }
        if let Err(e) = self.frame_states.remove(frame_id).await {
            warn!("Failed to remove frame state for {}: {}", frame_id, e);
        }
    }
}

/// Remove image files with `extension` from `dir`. Returns how many went.
async fn clear_output_dir(dir: &Path, extension: &str) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!("Failed to list {:?}: {}", dir, e);
            return 0;
        }
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale frame {:?}: {}", path, e),
            }
        }
    }
    removed
}
