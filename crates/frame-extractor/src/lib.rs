//! Frame extractor module
//!
//! Grabs one frame at a uniformly random timestamp and scores its visual
//! variance. Extraction failures are expected and retried by the caller.

pub mod tools;

use frame_randomizer_common::{ExtractionError, ExtractionResult, FrameConfig};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub use tools::{
    parse_score, run_tool, FfmpegFrameGrabber, FrameGrabber, IdentifyQualityMeter, QualityMeter,
};

/// A frame written to disk together with its quality score
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFrame {
    pub image_path: PathBuf,
    pub timestamp_secs: f64,
    pub quality_score: f64,
}

/// Frame extractor configuration and tools
#[derive(Clone)]
pub struct FrameExtractor {
    /// Directory frames are written to
    pub output_dir: PathBuf,
    /// Image extension, which also selects ffmpeg's encoder
    pub extension: String,
    grabber: Arc<dyn FrameGrabber>,
    meter: Arc<dyn QualityMeter>,
}

impl FrameExtractor {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        grabber: Arc<dyn FrameGrabber>,
        meter: Arc<dyn QualityMeter>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            extension: extension.into(),
            grabber,
            meter,
        }
    }

    /// ffmpeg + identify extractor from configuration
    #[must_use]
    pub fn from_config(config: &FrameConfig) -> Self {
        let timeout = config.subprocess_timeout();
        Self::new(
            config.frame_output_dir.clone(),
            config.image_output_extension.clone(),
            Arc::new(FfmpegFrameGrabber::new(
                &config.ffmpeg_path,
                config.ffmpeg_image_command_inject.as_deref(),
                timeout,
            )),
            Arc::new(IdentifyQualityMeter::new(&config.identify_path, timeout)),
        )
    }

    /// Output path for attempt `attempt` of frame `frame_id`.
    ///
    /// Every attempt gets its own file: `<frame_id>.<attempt>.<ext>`.
    #[must_use]
    pub fn attempt_path(&self, frame_id: &str, attempt: u32) -> PathBuf {
        self.output_dir
            .join(format!("{frame_id}.{attempt}.{}", self.extension))
    }

    /// Extract a frame at a random timestamp in `[0, duration_secs)` and score it.
    ///
    /// On failure nothing is left at the output path.
    pub async fn extract(
        &self,
        video: &Path,
        duration_secs: f64,
        frame_id: &str,
        attempt: u32,
    ) -> ExtractionResult<ExtractedFrame> {
        let output = self.attempt_path(frame_id, attempt);
        let timestamp_secs = random_timestamp(duration_secs);

        match self.grab_and_score(video, timestamp_secs, &output).await {
            Ok(quality_score) => {
                debug!(
                    "Extracted {:?} @ {:.3}s score={:.1}",
                    output, timestamp_secs, quality_score
                );
                Ok(ExtractedFrame {
                    image_path: output,
                    timestamp_secs,
                    quality_score,
                })
            }
            Err(e) => {
                discard(&output).await;
                Err(e)
            }
        }
    }

    async fn grab_and_score(
        &self,
        video: &Path,
        timestamp_secs: f64,
        output: &Path,
    ) -> ExtractionResult<f64> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        self.grabber.grab(video, timestamp_secs, output).await?;

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            _ => return Err(ExtractionError::EmptyOutput(output.to_path_buf())),
        }

        self.meter.score(output).await
    }
}

/// Uniformly random timestamp in `[0, duration_secs)`; 0 for empty durations
#[must_use]
pub fn random_timestamp(duration_secs: f64) -> f64 {
    if duration_secs > 0.0 && duration_secs.is_finite() {
        rand::rng().random_range(0.0..duration_secs)
    } else {
        0.0
    }
}

/// Remove a file, ignoring absence
pub async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}
