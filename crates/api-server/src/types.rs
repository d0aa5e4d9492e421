//! API request and response types

use frame_randomizer_common::EpisodeRecord;
use frame_randomizer_orchestrator::{CheckResult, PoolStatus, ServedFrame};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pool: PoolResponse,
}

/// Pool counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolResponse {
    pub target: usize,
    pub ready: usize,
    pub generating: usize,
    pub active_attempts: usize,
}

impl From<PoolStatus> for PoolResponse {
    fn from(status: PoolStatus) -> Self {
        Self {
            target: status.target,
            ready: status.ready,
            generating: status.generating,
            active_attempts: status.active_attempts,
        }
    }
}

/// A freshly served frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenResponse {
    pub frame_id: String,
    pub image_url: String,
}

impl GenResponse {
    #[must_use]
    pub fn from_served(frame: &ServedFrame) -> Self {
        Self {
            frame_id: frame.frame_id.clone(),
            image_url: format!("/api/frame/get/{}", frame.frame_id),
        }
    }
}

/// Guess query. Values that are absent or not numbers never match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckQuery {
    pub season: Option<String>,
    pub episode: Option<String>,
}

impl CheckQuery {
    #[must_use]
    pub fn season(&self) -> Option<u32> {
        self.season.as_deref().and_then(|s| s.trim().parse().ok())
    }

    #[must_use]
    pub fn episode(&self) -> Option<u32> {
        self.episode.as_deref().and_then(|s| s.trim().parse().ok())
    }
}

/// Result of a guess
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub season: u32,
    pub episode: u32,
    pub name: String,
    pub overview: String,
    pub correct: bool,
}

impl From<CheckResult> for CheckResponse {
    fn from(result: CheckResult) -> Self {
        Self {
            season: result.season,
            episode: result.episode,
            name: result.name,
            overview: result.overview,
            correct: result.correct,
        }
    }
}

/// One entry of the episode list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeResponse {
    pub season: u32,
    pub episode: u32,
    pub name: String,
    pub overview: String,
}

impl From<&EpisodeRecord> for EpisodeResponse {
    fn from(record: &EpisodeRecord) -> Self {
        Self {
            season: record.season,
            episode: record.episode,
            name: record.name.clone(),
            overview: record.overview.clone(),
        }
    }
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_gen_response_is_camel_case() {
        let response = GenResponse::from_served(&ServedFrame {
            frame_id: "abc".to_string(),
            image_path: PathBuf::from("/frames/abc.1.webp"),
        });
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["frameId"], "abc");
        assert_eq!(json["imageUrl"], "/api/frame/get/abc");
    }

    #[test]
    fn test_check_query_parsing() {
        let query = CheckQuery {
            season: Some("2".to_string()),
            episode: Some("x".to_string()),
        };
        assert_eq!(query.season(), Some(2));
        assert_eq!(query.episode(), None);
        assert_eq!(CheckQuery::default().season(), None);
    }

    #[test]
    fn test_pool_response_serialization() {
        let json = serde_json::to_value(PoolResponse::from(PoolStatus {
            target: 3,
            ready: 2,
            generating: 1,
            active_attempts: 1,
        }))
        .unwrap();
        assert_eq!(json["activeAttempts"], 1);
        assert_eq!(json["ready"], 2);
    }
}
