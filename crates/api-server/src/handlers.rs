//! HTTP request handlers for API endpoints

use std::path::Path as FsPath;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use frame_randomizer_orchestrator::CheckError;
use tracing::{debug, error, warn};

use crate::{
    types::{
        CheckQuery, CheckResponse, EpisodeResponse, ErrorResponse, GenResponse, HealthResponse,
    },
    ApiState,
};

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Health check endpoint
pub async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pool: state.randomizer.status().await.into(),
    })
}

/// Serve a frame from the ready pool.
///
/// An empty pool is transient: 503 with `Retry-After`.
pub async fn generate_frame(State(state): State<ApiState>) -> Response {
    match state.randomizer.take_ready().await {
        Ok(frame) => {
            debug!("Served frame {}", frame.frame_id);
            Json(GenResponse::from_served(&frame)).into_response()
        }
        Err(e) => {
            warn!("Frame requested but {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, "1")],
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Image bytes of a served frame
pub async fn get_frame(State(state): State<ApiState>, Path(frame_id): Path<String>) -> Response {
    let Some(path) = state.randomizer.frame_path(&frame_id).await else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Frame not found for id \"{frame_id}\""),
        );
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => error_response(
            StatusCode::NOT_FOUND,
            format!("Frame not found for id \"{frame_id}\""),
        ),
        Err(e) => {
            error!("Failed to read frame {:?}: {}", path, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read frame")
        }
    }
}

/// Check a guess for a served frame
pub async fn check_answer(
    State(state): State<ApiState>,
    Path(frame_id): Path<String>,
    Query(query): Query<CheckQuery>,
) -> Response {
    match state
        .randomizer
        .check(&frame_id, query.season(), query.episode())
        .await
    {
        Ok(result) => Json(CheckResponse::from(result)).into_response(),
        Err(e) => check_error(e),
    }
}

/// `/api/frame/check` without an id
pub async fn check_missing_id() -> Response {
    check_error(CheckError::MissingId)
}

fn check_error(e: CheckError) -> Response {
    let status = match e {
        CheckError::MissingId => StatusCode::BAD_REQUEST,
        CheckError::NotFound(_) => StatusCode::NOT_FOUND,
    };
    error_response(status, e.to_string())
}

/// Episode list for building guesses
pub async fn list_episodes(State(state): State<ApiState>) -> impl IntoResponse {
    let episodes: Vec<EpisodeResponse> = state
        .randomizer
        .episodes()
        .iter()
        .map(EpisodeResponse::from)
        .collect();
    Json(episodes)
}

fn content_type(path: &FsPath) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("webp") => "image/webp",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("avif") => "image/avif",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
