//! Duration probing with a persistent cache and a concurrency cap

use frame_randomizer_common::{IndexError, IndexResult, ProbeCacheEntry};
use frame_randomizer_storage::Store;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Measures the duration of a video file
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// Duration in seconds, unvalidated
    async fn probe_duration(&self, path: &Path) -> IndexResult<f64>;
}

/// `ffprobe` based prober
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    pub ffprobe_path: PathBuf,
    pub timeout: Duration,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            timeout,
        }
    }
}

/// Parse ffprobe's `format=duration` csv output
pub fn parse_duration_output(path: &Path, stdout: &str) -> IndexResult<f64> {
    let trimmed = stdout.trim();
    trimmed
        .parse::<f64>()
        .map_err(|_| IndexError::InvalidDuration {
            path: path.to_path_buf(),
            value: trimmed.to_string(),
        })
}

#[async_trait::async_trait]
impl Prober for FfprobeProber {
    async fn probe_duration(&self, path: &Path) -> IndexResult<f64> {
        let child = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-show_entries",
                "format=duration",
                "-of",
                "csv=p=0",
                "-i",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| IndexError::Probe {
                path: path.to_path_buf(),
                message: format!("timed out after {:.1}s", self.timeout.as_secs_f64()),
            })?
            .map_err(|e| IndexError::Probe {
                path: path.to_path_buf(),
                message: format!("failed to execute ffprobe: {e}"),
            })?;

        if !output.status.success() {
            return Err(IndexError::Probe {
                path: path.to_path_buf(),
                message: format!(
                    "ffprobe exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        parse_duration_output(path, &String::from_utf8_lossy(&output.stdout))
    }
}

/// Cache-first duration lookup.
///
/// A cache hit skips probing entirely. Misses are probed under the optional
/// concurrency limit (FIFO queueing) and written back. Cache failures are
/// logged and treated as misses.
#[derive(Clone)]
pub struct ProbeCache {
    prober: Arc<dyn Prober>,
    cache: Option<Arc<dyn Store<ProbeCacheEntry>>>,
    limiter: Option<Arc<Semaphore>>,
}

impl ProbeCache {
    /// `limit` of `None` means unbounded probe concurrency
    pub fn new(
        prober: Arc<dyn Prober>,
        cache: Option<Arc<dyn Store<ProbeCacheEntry>>>,
        limit: Option<usize>,
    ) -> Self {
        Self {
            prober,
            cache,
            limiter: limit.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    /// Resolve the duration of `path`, validated as finite and non-negative
    pub async fn duration(&self, path: &Path) -> IndexResult<f64> {
        let key = path.to_string_lossy();

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(entry)) => {
                    debug!("Probe cache hit for {:?}", path);
                    return validate_duration(path, entry.duration_secs);
                }
                Ok(None) => {}
                Err(e) => warn!("Probe cache read failed for {:?}: {}", path, e),
            }
        }

        let duration = {
            let _permit = match &self.limiter {
                Some(limiter) => Some(limiter.acquire().await.map_err(|_| IndexError::Probe {
                    path: path.to_path_buf(),
                    message: "probe limiter closed".to_string(),
                })?),
                None => None,
            };
            debug!("Probing {:?}", path);
            self.prober.probe_duration(path).await?
        };
        let duration = validate_duration(path, duration)?;

        if let Some(cache) = &self.cache {
            let entry = ProbeCacheEntry {
                duration_secs: duration,
            };
            if let Err(e) = cache.set(&key, entry, None).await {
                warn!("Probe cache write failed for {:?}: {}", path, e);
            }
        }

        Ok(duration)
    }
}

fn validate_duration(path: &Path, duration: f64) -> IndexResult<f64> {
    if duration.is_finite() && duration >= 0.0 {
        Ok(duration)
    } else {
        Err(IndexError::InvalidDuration {
            path: path.to_path_buf(),
            value: duration.to_string(),
        })
    }
}
