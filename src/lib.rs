//! Frame Randomizer
//!
//! Pulls random still frames out of a show's episodes, keeps a pool of them
//! ready to serve and checks season/episode guesses against them.
//!
//! The work is split across the workspace crates, re-exported here:
//! - [`common`]: shared types, errors and configuration
//! - [`storage`]: keyed stores with per-item expiry
//! - [`ingestion`]: video discovery, metadata join and duration probing
//! - [`extractor`]: single-frame extraction and quality scoring
//! - [`orchestrator`]: attempt control, the ready pool and cleanup

pub use frame_randomizer_common as common;
pub use frame_randomizer_extractor as extractor;
pub use frame_randomizer_ingestion as ingestion;
pub use frame_randomizer_orchestrator as orchestrator;
pub use frame_randomizer_storage as storage;

pub use frame_randomizer_common::{load_config, FrameConfig};
pub use frame_randomizer_orchestrator::{CheckError, CheckResult, FrameRandomizer, ServedFrame};
