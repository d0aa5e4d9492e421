//! Cleanup sweeper
//!
//! Each sweep reconciles the output directory with the frame-state store,
//! purges expired answers, drops expired unserved slots and tops the pool
//! back up. A failure on one item is logged and the sweep moves on.

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use frame_randomizer_extractor::discard;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::Inner;

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Image files without a live frame-state entry
    pub orphan_files_removed: usize,
    /// Frame-state entries that expired or lost their file
    pub stale_states_removed: usize,
    pub answers_expired: usize,
    pub slots_expired: usize,
    pub pipelines_started: usize,
    /// Items skipped because of an error
    pub errors: usize,
}

/// Run a sweep every `period` until the service is dropped or the task aborted
pub(crate) fn spawn(inner: Weak<Inner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.sweep().await;
        }
        debug!("Sweeper stopped");
    })
}

/// Frame id encoded in an output file name: everything before the first '.'
pub(crate) fn frame_id_of(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    let (id, _) = name.split_once('.')?;
    (!id.is_empty()).then_some(id)
}

impl Inner {
    pub(crate) async fn sweep(self: &Arc<Self>) -> SweepReport {
        let mut report = SweepReport::default();

        self.remove_orphan_files(&mut report).await;
        self.remove_stale_states(&mut report).await;

        report.answers_expired = self.answers.purge_expired().await.len();

        for slot in self.pool.remove_expired().await {
            debug!("Unserved frame {} expired", slot.frame_id);
            discard(&slot.image_path).await;
            if let Err(e) = self.frame_states.remove(&slot.frame_id).await {
                error!("Failed to remove frame state for {}: {}", slot.frame_id, e);
                report.errors += 1;
            }
            self.answers.remove(&slot.frame_id).await;
            report.slots_expired += 1;
        }

        report.pipelines_started = self.top_up().await;

        info!(
            "Sweep done: {} orphan files, {} stale states, {} answers, {} slots expired, {} errors",
            report.orphan_files_removed,
            report.stale_states_removed,
            report.answers_expired,
            report.slots_expired,
            report.errors
        );
        report
    }

    /// Delete output files whose frame has no live frame-state entry
    async fn remove_orphan_files(&self, report: &mut SweepReport) {
        let dir = &self.controller.extractor().output_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                error!("Failed to list {:?}: {}", dir, e);
                report.errors += 1;
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read entry in {:?}: {}", dir, e);
                    report.errors += 1;
                    break;
                }
            };
            let path = entry.path();
            if !entry.file_type().await.is_ok_and(|t| t.is_file()) {
                continue;
            }
            let Some(frame_id) = frame_id_of(&path) else {
                continue;
            };
            if self.in_flight.contains(frame_id) {
                continue;
            }

            let tracked = match self.frame_states.get(frame_id).await {
                Ok(state) => state.is_some_and(|s| s.path == path),
                Err(e) => {
                    error!("Failed to read frame state for {}: {}", frame_id, e);
                    report.errors += 1;
                    continue;
                }
            };
            if tracked {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Removed orphan frame {:?}", path);
                    report.orphan_files_removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    error!("Failed to remove orphan frame {:?}: {}", path, e);
                    report.errors += 1;
                }
            }
        }
    }

    /// Drop expired frame-state entries and entries whose file is gone
    async fn remove_stale_states(&self, report: &mut SweepReport) {
        match self.frame_states.purge_expired().await {
            Ok(expired) => report.stale_states_removed += expired.len(),
            Err(e) => {
                error!("Failed to purge expired frame states: {}", e);
                report.errors += 1;
            }
        }

        let keys = match self.frame_states.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                error!("Failed to list frame states: {}", e);
                report.errors += 1;
                return;
            }
        };

        for frame_id in keys {
            let state = match self.frame_states.get(&frame_id).await {
                Ok(Some(state)) => state,
                Ok(None) => continue,
                Err(e) => {
                    error!("Failed to read frame state for {}: {}", frame_id, e);
                    report.errors += 1;
                    continue;
                }
            };
            if tokio::fs::try_exists(&state.path).await.unwrap_or(true) {
                continue;
            }

            if let Err(e) = self.frame_states.remove(&frame_id).await {
                error!("Failed to remove frame state for {}: {}", frame_id, e);
                report.errors += 1;
                continue;
            }
            report.stale_states_removed += 1;
            // An unserved slot without its image can never be served
            if self.pool.remove(&frame_id).await.is_some() {
                self.answers.remove(&frame_id).await;
            }
            debug!("Frame {} lost its file {:?}", frame_id, state.path);
        }
    }
}
