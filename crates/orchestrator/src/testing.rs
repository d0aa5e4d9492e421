//! Test doubles for the extraction tools

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use frame_randomizer_common::{EpisodeRecord, ExtractionError};
use frame_randomizer_extractor::{FrameExtractor, FrameGrabber, QualityMeter};

pub fn episode(season: u32, episode: u32) -> EpisodeRecord {
    EpisodeRecord {
        season,
        episode,
        name: format!("Episode {episode}"),
        overview: format!("Overview of S{season}E{episode}"),
        path: PathBuf::from(format!("/videos/S{season:02}E{episode:02}.mkv")),
        duration_secs: 100.0,
    }
}

pub fn extractor<G, M>(dir: &Path, grabber: Arc<G>, meter: Arc<M>) -> FrameExtractor
where
    G: FrameGrabber + 'static,
    M: QualityMeter + 'static,
{
    FrameExtractor::new(dir, "webp", grabber, meter)
}

/// Writes a small file, failing the first `fail_first` calls
pub struct TouchGrabber {
    pub calls: AtomicU32,
    fail_first: u32,
}

impl TouchGrabber {
    pub fn ok() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub fn failing_first(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail_first,
        })
    }
}

#[async_trait::async_trait]
impl FrameGrabber for TouchGrabber {
    async fn grab(
        &self,
        _video: &Path,
        _timestamp_secs: f64,
        output: &Path,
    ) -> Result<(), ExtractionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            return Err(ExtractionError::ToolFailed {
                tool: "ffmpeg".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "simulated failure".to_string(),
            });
        }
        tokio::fs::write(output, b"frame").await?;
        Ok(())
    }
}

/// Sleeps while "holding a subprocess" and records peak concurrency
pub struct SlowGrabber {
    pub current: AtomicUsize,
    pub peak: AtomicUsize,
    delay: Duration,
}

impl SlowGrabber {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay,
        })
    }
}

#[async_trait::async_trait]
impl FrameGrabber for SlowGrabber {
    async fn grab(
        &self,
        _video: &Path,
        _timestamp_secs: f64,
        output: &Path,
    ) -> Result<(), ExtractionError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        tokio::fs::write(output, b"frame").await?;
        Ok(())
    }
}

/// Records the frame id of each grab in the order grabs begin
pub struct RecordingGrabber {
    pub order: Mutex<Vec<String>>,
    delay: Duration,
}

impl RecordingGrabber {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            order: Mutex::new(Vec::new()),
            delay,
        })
    }
}

#[async_trait::async_trait]
impl FrameGrabber for RecordingGrabber {
    async fn grab(
        &self,
        _video: &Path,
        _timestamp_secs: f64,
        output: &Path,
    ) -> Result<(), ExtractionError> {
        let name = output.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let frame_id = name.split('.').next().unwrap_or_default().to_string();
        self.order.lock().unwrap().push(frame_id);
        tokio::time::sleep(self.delay).await;
        tokio::fs::write(output, b"frame").await?;
        Ok(())
    }
}

/// Returns scripted scores in order, then repeats the last one
pub struct ScriptedMeter {
    scores: Mutex<VecDeque<f64>>,
    fallback: f64,
}

impl ScriptedMeter {
    pub fn new(scores: &[f64]) -> Arc<Self> {
        Arc::new(Self {
            scores: Mutex::new(scores.iter().copied().collect()),
            fallback: scores.last().copied().unwrap_or(0.0),
        })
    }

    pub fn constant(score: f64) -> Arc<Self> {
        Self::new(&[score])
    }
}

#[async_trait::async_trait]
impl QualityMeter for ScriptedMeter {
    async fn score(&self, _image: &Path) -> Result<f64, ExtractionError> {
        let next = self.scores.lock().unwrap().pop_front();
        Ok(next.unwrap_or(self.fallback))
    }
}
