//! Generation attempt controller
//!
//! Drives one [`FrameTask`] through repeated extraction attempts until a frame
//! clears the quality threshold or the attempt budget runs out. Attempts of one
//! task run strictly in sequence. Across tasks, a shared FIFO semaphore bounds
//! how many attempts hold a subprocess at the same time.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use frame_randomizer_common::{EpisodeRecord, ExtractionError, FrameConfig, FrameId};
use frame_randomizer_extractor::{discard, ExtractedFrame, FrameExtractor};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Current state of a frame task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, waiting for its first admission
    Pending,
    /// Running attempt `n` (1-based)
    Attempting(u32),
    /// Attempt `n` fell short; another attempt follows
    Retrying(u32),
    /// A frame met the quality threshold
    Succeeded,
    /// Budget spent; the best candidate was kept
    Exhausted,
    /// Budget spent without a single usable frame
    Failed,
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted | Self::Failed)
    }
}

/// Errors that end a task without a frame
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("All {attempts} attempts failed for {frame_id}")]
    AllAttemptsFailed {
        frame_id: FrameId,
        attempts: u32,
        #[source]
        last: Option<ExtractionError>,
    },

    #[error("Attempt admission closed")]
    AdmissionClosed,
}

/// One frame being generated. Dropped once terminal.
#[derive(Debug)]
pub struct FrameTask {
    pub frame_id: FrameId,
    pub state: TaskState,
    attempts: u32,
    max_attempts: u32,
    best: Option<ExtractedFrame>,
}

impl FrameTask {
    #[must_use]
    pub fn new(frame_id: FrameId, max_attempts: u32) -> Self {
        Self {
            frame_id,
            state: TaskState::Pending,
            attempts: 0,
            max_attempts,
            best: None,
        }
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn best(&self) -> Option<&ExtractedFrame> {
        self.best.as_ref()
    }

    fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.state = TaskState::Attempting(self.attempts);
        self.attempts
    }

    /// Keep `frame` if it beats the current best and return the file that lost.
    /// Equal scores keep the earlier frame.
    fn offer(&mut self, frame: ExtractedFrame) -> Option<PathBuf> {
        match self.best.take() {
            Some(best) if best.quality_score >= frame.quality_score => {
                self.best = Some(best);
                Some(frame.image_path)
            }
            previous => {
                self.best = Some(frame);
                previous.map(|p| p.image_path)
            }
        }
    }
}

/// The single file left behind by a finished task
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFrame {
    pub frame_id: FrameId,
    pub image_path: PathBuf,
    pub quality_score: f64,
    pub timestamp_secs: f64,
    pub attempts: u32,
    /// `Succeeded` or `Exhausted`
    pub state: TaskState,
}

/// Frame ids whose pipeline has not finished yet.
///
/// Their attempt files may be on disk before any frame-state entry exists, so
/// cleanup must leave them alone.
#[derive(Debug, Default)]
pub struct InFlightFrames {
    ids: Mutex<HashSet<FrameId>>,
}

impl InFlightFrames {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `frame_id` until the returned guard is dropped
    pub fn register(self: &Arc<Self>, frame_id: &str) -> InFlightGuard {
        self.lock().insert(frame_id.to_string());
        InFlightGuard {
            frames: Arc::clone(self),
            frame_id: frame_id.to_string(),
        }
    }

    #[must_use]
    pub fn contains(&self, frame_id: &str) -> bool {
        self.lock().contains(frame_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<FrameId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes its frame id from [`InFlightFrames`] on drop
#[derive(Debug)]
pub struct InFlightGuard {
    frames: Arc<InFlightFrames>,
    frame_id: FrameId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.frames.lock().remove(&self.frame_id);
    }
}

/// Runs frame tasks under a global attempt limit
#[derive(Clone)]
pub struct AttemptController {
    extractor: FrameExtractor,
    max_attempts: u32,
    /// `None` disables the quality gate
    threshold: Option<f64>,
    permits: Arc<Semaphore>,
    max_parallelism: usize,
}

impl AttemptController {
    /// `max_attempts` and `max_parallelism` are clamped to at least 1
    pub fn new(
        extractor: FrameExtractor,
        max_attempts: u32,
        threshold: Option<f64>,
        max_parallelism: usize,
    ) -> Self {
        let max_parallelism = max_parallelism.max(1);
        Self {
            extractor,
            max_attempts: max_attempts.max(1),
            threshold,
            permits: Arc::new(Semaphore::new(max_parallelism)),
            max_parallelism,
        }
    }

    #[must_use]
    pub fn from_config(config: &FrameConfig, extractor: FrameExtractor) -> Self {
        Self::new(
            extractor,
            config.frame_gen_max_attempts,
            config.quality_threshold(),
            config.frame_gen_max_parallelism,
        )
    }

    #[must_use]
    pub fn extractor(&self) -> &FrameExtractor {
        &self.extractor
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts currently holding an admission permit
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max_parallelism - self.permits.available_permits()
    }

    fn meets_threshold(&self, score: f64) -> bool {
        self.threshold.map_or(true, |min| score >= min)
    }

    /// Generate one frame of `episode` under `frame_id`.
    ///
    /// On every exit path at most one attempt file remains: the returned frame.
    pub async fn run(
        &self,
        frame_id: FrameId,
        episode: &EpisodeRecord,
    ) -> Result<GeneratedFrame, GenerationError> {
        let mut task = FrameTask::new(frame_id, self.max_attempts);
        let result = self.drive(&mut task, episode).await;
        debug!(
            "Task {} for {} ended in {:?} after {} attempts",
            task.frame_id,
            episode.tag(),
            task.state,
            task.attempts()
        );
        result
    }

    async fn drive(
        &self,
        task: &mut FrameTask,
        episode: &EpisodeRecord,
    ) -> Result<GeneratedFrame, GenerationError> {
        let mut last_error = None;

        while task.has_attempts_left() {
            let extracted = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| GenerationError::AdmissionClosed)?;
                let attempt = task.begin_attempt();
                self.extractor
                    .extract(
                        &episode.path,
                        episode.duration_secs,
                        &task.frame_id,
                        attempt,
                    )
                    .await
            };

            match extracted {
                Ok(frame) if self.meets_threshold(frame.quality_score) => {
                    if let Some(best) = task.best.take() {
                        discard(&best.image_path).await;
                    }
                    task.state = TaskState::Succeeded;
                    return Ok(finish(task, frame));
                }
                Ok(frame) => {
                    debug!(
                        "Frame {} attempt {} scored {:.1}, below threshold",
                        task.frame_id,
                        task.attempts(),
                        frame.quality_score
                    );
                    if let Some(loser) = task.offer(frame) {
                        discard(&loser).await;
                    }
                }
                Err(e) => {
                    warn!(
                        "Frame {} attempt {} failed for {}: {}",
                        task.frame_id,
                        task.attempts(),
                        episode.tag(),
                        e
                    );
                    last_error = Some(e);
                }
            }

            if task.has_attempts_left() {
                task.state = TaskState::Retrying(task.attempts());
            }
        }

        match task.best.take() {
            Some(best) => {
                info!(
                    "Frame {} exhausted {} attempts, using best score {:.1}",
                    task.frame_id,
                    task.attempts(),
                    best.quality_score
                );
                task.state = TaskState::Exhausted;
                Ok(finish(task, best))
            }
            None => {
                task.state = TaskState::Failed;
                Err(GenerationError::AllAttemptsFailed {
                    frame_id: task.frame_id.clone(),
                    attempts: task.attempts(),
                    last: last_error,
                })
            }
        }
    }
}

fn finish(task: &FrameTask, frame: ExtractedFrame) -> GeneratedFrame {
    GeneratedFrame {
        frame_id: task.frame_id.clone(),
        image_path: frame.image_path,
        quality_score: frame.quality_score,
        timestamp_secs: frame.timestamp_secs,
        attempts: task.attempts(),
        state: task.state,
    }
}
