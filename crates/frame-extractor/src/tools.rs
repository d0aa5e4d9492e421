//! External tools used per attempt: single-frame grab and image statistics

use frame_randomizer_common::{ExtractionError, ExtractionResult};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Writes one frame of `video` at `timestamp_secs` to `output`
#[async_trait::async_trait]
pub trait FrameGrabber: Send + Sync {
    async fn grab(
        &self,
        video: &Path,
        timestamp_secs: f64,
        output: &Path,
    ) -> ExtractionResult<()>;
}

/// Scores an image; higher means more visual information
#[async_trait::async_trait]
pub trait QualityMeter: Send + Sync {
    async fn score(&self, image: &Path) -> ExtractionResult<f64>;
}

/// Run a tool to completion under a timeout. The child is killed if the
/// timeout fires.
pub async fn run_tool(
    tool: &str,
    mut command: Command,
    timeout: Duration,
) -> ExtractionResult<Output> {
    command.stdin(Stdio::null()).kill_on_drop(true);
    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| ExtractionError::Timeout {
            tool: tool.to_string(),
            secs: timeout.as_secs_f64(),
        })?
        .map_err(|source| ExtractionError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ExtractionError::ToolFailed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// FFmpeg CLI single-frame grab
#[derive(Debug, Clone)]
pub struct FfmpegFrameGrabber {
    pub ffmpeg_path: PathBuf,
    /// Extra encoding arguments inserted before the output path
    pub inject: Vec<String>,
    pub timeout: Duration,
}

impl FfmpegFrameGrabber {
    /// `inject` is split on whitespace, e.g. `"-c:v libwebp -quality 80"`
    pub fn new(ffmpeg_path: impl Into<PathBuf>, inject: Option<&str>, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            inject: inject
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            timeout,
        }
    }

    /// Arguments for one invocation, without the program name
    #[must_use]
    pub fn args(&self, video: &Path, timestamp_secs: f64, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            // -ss before -i: input seeking
            "-ss".to_string(),
            format!("{timestamp_secs:.3}"),
            "-i".to_string(),
            video.to_string_lossy().into_owned(),
            "-frames:v".to_string(),
            "1".to_string(),
        ];
        args.extend(self.inject.iter().cloned());
        args.push("-y".to_string());
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait::async_trait]
impl FrameGrabber for FfmpegFrameGrabber {
    async fn grab(
        &self,
        video: &Path,
        timestamp_secs: f64,
        output: &Path,
    ) -> ExtractionResult<()> {
        let mut command = Command::new(&self.ffmpeg_path);
        command.args(self.args(video, timestamp_secs, output));
        debug!("ffmpeg grab {:?} @ {:.3}s -> {:?}", video, timestamp_secs, output);
        run_tool("ffmpeg", command, self.timeout).await?;
        Ok(())
    }
}

/// ImageMagick `identify` standard deviation
#[derive(Debug, Clone)]
pub struct IdentifyQualityMeter {
    pub identify_path: PathBuf,
    pub timeout: Duration,
}

impl IdentifyQualityMeter {
    pub fn new(identify_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            identify_path: identify_path.into(),
            timeout,
        }
    }
}

/// Parse the first number printed by `identify -format %[standard-deviation]`
pub fn parse_score(stdout: &str) -> ExtractionResult<f64> {
    let token = stdout.split_whitespace().next().unwrap_or_default();
    match token.parse::<f64>() {
        Ok(score) if score.is_finite() => Ok(score),
        _ => Err(ExtractionError::UnparsableScore(stdout.trim().to_string())),
    }
}

#[async_trait::async_trait]
impl QualityMeter for IdentifyQualityMeter {
    async fn score(&self, image: &Path) -> ExtractionResult<f64> {
        let mut command = Command::new(&self.identify_path);
        command
            .args(["-format", "%[standard-deviation]\n"])
            .arg(image);
        let output = run_tool("identify", command, self.timeout).await?;
        parse_score(&String::from_utf8_lossy(&output.stdout))
    }
}
