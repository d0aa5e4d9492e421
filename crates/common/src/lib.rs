/// Common types and utilities for frame generation
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub mod config;

pub use config::{load_config, ConfigError, FrameConfig};

/// Identifier of a generated frame. Also the file stem of its image.
pub type FrameId = String;

/// Errors raised while building the video index
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Couldn't find file for S{season:02}E{episode:02}")]
    MissingEpisode { season: u32, episode: u32 },

    #[error("Invalid duration for {path:?}: {value}")]
    InvalidDuration { path: PathBuf, value: String },

    #[error("Probe failed for {path:?}: {message}")]
    Probe { path: PathBuf, message: String },

    #[error("Invalid show data: {0}")]
    Metadata(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a single frame extraction attempt
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {secs:.1}s")]
    Timeout { tool: String, secs: f64 },

    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Output missing or empty: {0:?}")]
    EmptyOutput(PathBuf),

    #[error("Unparsable quality score: {0:?}")]
    UnparsableScore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for index building
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Result type for frame extraction
pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;

/// No frame is ready to be served. Transient; retry later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no frames ready")]
pub struct PoolEmptyError;

/// Metadata for one episode, as supplied by the show data file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowEpisode {
    pub season: u32,
    pub episode: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub overview: String,
}

/// An episode joined to its video file and probed duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub season: u32,
    pub episode: u32,
    pub name: String,
    pub overview: String,
    pub path: PathBuf,
    pub duration_secs: f64,
}

impl EpisodeRecord {
    /// "S01E02" style tag for this episode
    #[must_use]
    pub fn tag(&self) -> String {
        season_episode_tag(self.season, self.episode)
    }

    #[must_use]
    pub fn answer(&self) -> StoredAnswer {
        StoredAnswer {
            season: self.season,
            episode: self.episode,
        }
    }
}

/// Ground truth bound to a frame id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAnswer {
    pub season: u32,
    pub episode: u32,
}

/// Frame-state entry; one per image file in the output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFileState {
    pub path: PathBuf,
}

/// Persisted probe result for one video file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeCacheEntry {
    pub duration_secs: f64,
}

/// Generates a zero-padded "SxxExx" tag
#[must_use]
pub fn season_episode_tag(season: u32, episode: u32) -> String {
    format!("S{season:02}E{episode:02}")
}

/// Full episode name with the season/episode tag in front
#[must_use]
pub fn episode_name(season: u32, episode: u32, name: &str) -> String {
    format!("{} {}", season_episode_tag(season, episode), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_episode_tag_padding() {
        assert_eq!(season_episode_tag(1, 2), "S01E02");
        assert_eq!(season_episode_tag(12, 103), "S12E103");
    }

    #[test]
    fn test_episode_name() {
        assert_eq!(episode_name(3, 7, "Pilot"), "S03E07 Pilot");
    }

    #[test]
    fn test_missing_episode_message() {
        let err = IndexError::MissingEpisode {
            season: 2,
            episode: 5,
        };
        assert_eq!(err.to_string(), "Couldn't find file for S02E05");
    }

    #[test]
    fn test_episode_record_answer() {
        let record = EpisodeRecord {
            season: 1,
            episode: 4,
            name: "Name".to_string(),
            overview: String::new(),
            path: PathBuf::from("/videos/S01E04.mkv"),
            duration_secs: 1320.5,
        };

        assert_eq!(record.tag(), "S01E04");
        assert_eq!(
            record.answer(),
            StoredAnswer {
                season: 1,
                episode: 4
            }
        );
    }
}
