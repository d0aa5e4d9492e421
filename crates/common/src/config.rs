//! Configuration surface for frame generation.
//!
//! Every key has a default except the two source locations. Loading is a thin
//! TOML read; a missing file yields the defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file as TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default answer lifetime (4 hours)
pub const DEFAULT_ANSWER_EXPIRY_MS: u64 = 4 * 60 * 60 * 1000;

/// Default lifetime of a served frame image (5 minutes)
pub const DEFAULT_FRAME_EXPIRY_MS: u64 = 5 * 60 * 1000;

/// Default sweep interval (30 minutes)
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 30 * 60 * 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub show_data_path: PathBuf,
    pub video_source_dir: PathBuf,
    pub search_video_dir_recursively: bool,
    pub video_file_extensions: Vec<String>,
    pub allow_missing_episodes: bool,

    pub frame_output_dir: PathBuf,
    pub image_output_extension: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub identify_path: String,
    pub ffmpeg_image_command_inject: Option<String>,
    pub subprocess_timeout_ms: u64,

    pub use_ffprobe_cache: bool,
    pub ffprobe_cache_dir: PathBuf,
    /// 0 = unbounded
    pub ffprobe_initial_load_limit: usize,

    pub frame_gen_max_attempts: u32,
    pub frame_gen_max_parallelism: usize,
    pub frame_pregen_count: usize,
    /// 0 disables the quality gate
    pub frame_required_standard_deviation: f64,

    pub answer_expiry_ms: u64,
    pub frame_expiry_ms: u64,
    pub unserved_frame_expiry_ms: u64,
    pub cleanup_interval_ms: u64,

    pub bind_addr: String,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            show_data_path: PathBuf::new(),
            video_source_dir: PathBuf::new(),
            search_video_dir_recursively: true,
            video_file_extensions: ["avi", "mkv", "mov", "mp4", "webm"]
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            allow_missing_episodes: true,
            frame_output_dir: PathBuf::from("./frame-randomizer/frames"),
            image_output_extension: "webp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            identify_path: "identify".to_string(),
            ffmpeg_image_command_inject: None,
            subprocess_timeout_ms: 30_000,
            use_ffprobe_cache: true,
            ffprobe_cache_dir: PathBuf::from("./frame-randomizer/ffprobe-cache"),
            ffprobe_initial_load_limit: 0,
            frame_gen_max_attempts: 5,
            frame_gen_max_parallelism: 3,
            frame_pregen_count: 3,
            frame_required_standard_deviation: 2500.0,
            answer_expiry_ms: DEFAULT_ANSWER_EXPIRY_MS,
            frame_expiry_ms: DEFAULT_FRAME_EXPIRY_MS,
            unserved_frame_expiry_ms: DEFAULT_ANSWER_EXPIRY_MS,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl FrameConfig {
    /// Reject settings that would stall generation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_gen_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "frame_gen_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.frame_gen_max_parallelism == 0 {
            return Err(ConfigError::Invalid(
                "frame_gen_max_parallelism must be at least 1".to_string(),
            ));
        }
        let threshold = self.frame_required_standard_deviation;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "frame_required_standard_deviation must be a non-negative number, got {threshold}"
            )));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "cleanup_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Quality threshold, or `None` when the gate is disabled
    #[must_use]
    pub fn quality_threshold(&self) -> Option<f64> {
        (self.frame_required_standard_deviation > 0.0).then_some(self.frame_required_standard_deviation)
    }

    /// Probe concurrency limit, or `None` when unbounded
    #[must_use]
    pub fn probe_limit(&self) -> Option<usize> {
        (self.ffprobe_initial_load_limit > 0).then_some(self.ffprobe_initial_load_limit)
    }

    #[must_use]
    pub fn answer_expiry(&self) -> Duration {
        Duration::from_millis(self.answer_expiry_ms)
    }

    #[must_use]
    pub fn frame_expiry(&self) -> Duration {
        Duration::from_millis(self.frame_expiry_ms)
    }

    #[must_use]
    pub fn unserved_frame_expiry(&self) -> Duration {
        Duration::from_millis(self.unserved_frame_expiry_ms)
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    #[must_use]
    pub fn subprocess_timeout(&self) -> Duration {
        Duration::from_millis(self.subprocess_timeout_ms)
    }
}

/// Load configuration from a TOML file. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<FrameConfig, ConfigError> {
    if !path.exists() {
        return Ok(FrameConfig::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: FrameConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
