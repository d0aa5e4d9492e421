//! HTTP API for the frame randomizer
//!
//! - `GET /api/frame/gen`: take a ready frame
//! - `GET /api/frame/get/{id}`: image bytes of a served frame
//! - `GET /api/frame/check/{id}?season=&episode=`: check a guess, once
//! - `GET /api/show`: episode list

mod handlers;
mod types;

use axum::{routing::get, Router};
use frame_randomizer_orchestrator::FrameRandomizer;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    pub randomizer: Arc<FrameRandomizer>,
}

impl ApiState {
    #[must_use]
    pub fn new(randomizer: Arc<FrameRandomizer>) -> Self {
        Self { randomizer }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Frames
        .route("/api/frame/gen", get(generate_frame))
        .route("/api/frame/get/{id}", get(get_frame))
        .route("/api/frame/check", get(check_missing_id))
        .route("/api/frame/check/", get(check_missing_id))
        .route("/api/frame/check/{id}", get(check_answer))
        // Show metadata
        .route("/api/show", get(list_episodes))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on an already bound listener
pub async fn serve(listener: TcpListener, state: ApiState) -> Result<(), std::io::Error> {
    axum::serve(listener, build_router(state)).await
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state).await
}
