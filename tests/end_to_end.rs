//! End-to-end tests: index, pool, serve, check, expire
//!
//! `test_start_from_config` drives the real startup path with shell stand-ins
//! for ffprobe, ffmpeg and identify. `test_real_tools` needs the actual tools
//! and a video; run it with `cargo test -- --ignored` and `FR_TEST_VIDEO` set.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use frame_randomizer::common::{EpisodeRecord, ExtractionError};
use frame_randomizer::extractor::{FrameExtractor, FrameGrabber, QualityMeter};
use frame_randomizer::orchestrator::{AnswerStore, AttemptController, ServiceParts};
use frame_randomizer::storage::MemoryStore;
use frame_randomizer::{CheckError, FrameConfig, FrameRandomizer};
use tempfile::TempDir;

struct WriteGrabber;

#[async_trait::async_trait]
impl FrameGrabber for WriteGrabber {
    async fn grab(&self, _video: &Path, t: f64, output: &Path) -> Result<(), ExtractionError> {
        assert!((0.0..100.0).contains(&t));
        tokio::fs::write(output, b"frame").await?;
        Ok(())
    }
}

struct DarkMeter;

#[async_trait::async_trait]
impl QualityMeter for DarkMeter {
    async fn score(&self, _image: &Path) -> Result<f64, ExtractionError> {
        Ok(0.0)
    }
}

fn pilot() -> EpisodeRecord {
    EpisodeRecord {
        season: 1,
        episode: 1,
        name: "Pilot".to_string(),
        overview: "It begins.".to_string(),
        path: PathBuf::from("/videos/Show S01E01.mkv"),
        duration_secs: 100.0,
    }
}

async fn single_frame_service(frames: &Path, answer_ttl: Duration) -> FrameRandomizer {
    let extractor = FrameExtractor::new(frames, "webp", Arc::new(WriteGrabber), Arc::new(DarkMeter));
    FrameRandomizer::with_parts(ServiceParts {
        episodes: vec![pilot()],
        // one attempt, quality gate disabled
        controller: AttemptController::new(extractor, 1, None, 1),
        answers: AnswerStore::in_memory(answer_ttl),
        frame_states: Arc::new(MemoryStore::new()),
        pool_size: 1,
        frame_expiry: Duration::from_secs(300),
        unserved_frame_expiry: Duration::from_secs(3600),
        cleanup_interval: None,
    })
    .await
    .unwrap()
}

async fn wait_for_pool(service: &FrameRandomizer) {
    for _ in 0..400 {
        if service.status().await.ready >= 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("pool never filled: {:?}", service.status().await);
}

#[tokio::test]
async fn test_single_episode_round_trip() {
    let frames = TempDir::new().unwrap();
    let service = single_frame_service(frames.path(), Duration::from_secs(3600)).await;
    wait_for_pool(&service).await;

    let served = service.take_ready().await.unwrap();
    assert!(!served.frame_id.is_empty());
    assert!(served.image_path.exists());

    let result = service
        .check(&served.frame_id, Some(1), Some(1))
        .await
        .unwrap();
    assert!(result.correct);
    assert_eq!(result.name, "Pilot");
    assert_eq!(result.overview, "It begins.");

    // cleanup is fire-and-forget
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        service.check(&served.frame_id, Some(1), Some(1)).await,
        Err(CheckError::NotFound(served.frame_id.clone()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_answer_expires_without_check() {
    let frames = TempDir::new().unwrap();
    let service = single_frame_service(frames.path(), Duration::from_millis(1000)).await;
    wait_for_pool(&service).await;

    let served = service.take_ready().await.unwrap();
    tokio::time::advance(Duration::from_millis(1001)).await;

    let report = service.sweep_now().await;
    assert!(report.answers_expired >= 1);
    assert_eq!(
        service.check(&served.frame_id, Some(1), Some(1)).await,
        Err(CheckError::NotFound(served.frame_id.clone()))
    );
    // the image has its own lifetime
    assert!(served.image_path.exists());
}

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn test_start_from_config() {
    let root = TempDir::new().unwrap();
    let bin = root.path().join("bin");
    let videos = root.path().join("videos");
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::create_dir_all(videos.join("Season 1")).unwrap();
    std::fs::write(videos.join("Season 1").join("Show - S01E01.mkv"), b"").unwrap();
    std::fs::write(videos.join("Show - 1x02.mp4"), b"").unwrap();
    std::fs::write(videos.join("notes.txt"), b"").unwrap();

    let show = root.path().join("show.json");
    std::fs::write(
        &show,
        r#"{"episodes": [
            {"season": 1, "episode": 1, "name": "Pilot", "overview": "It begins."},
            {"season": 1, "episode": 2, "name": "Second", "overview": "It continues."},
            {"season": 1, "episode": 3, "name": "Missing", "overview": "No file."}
        ]}"#,
    )
    .unwrap();

    let config = FrameConfig {
        show_data_path: show,
        video_source_dir: videos,
        frame_output_dir: root.path().join("frames"),
        ffprobe_cache_dir: root.path().join("probe-cache"),
        ffprobe_path: write_script(&bin, "ffprobe", "echo 100.000000")
            .to_string_lossy()
            .into_owned(),
        ffmpeg_path: write_script(&bin, "ffmpeg", "for last; do :; done\nprintf 'img' > \"$last\"")
            .to_string_lossy()
            .into_owned(),
        identify_path: write_script(&bin, "identify", "echo 3000")
            .to_string_lossy()
            .into_owned(),
        frame_pregen_count: 2,
        ..FrameConfig::default()
    };

    let service = FrameRandomizer::start(&config).await.unwrap();
    let tags: Vec<String> = service.episodes().iter().map(EpisodeRecord::tag).collect();
    assert_eq!(tags, vec!["S01E01", "S01E02"]);

    for _ in 0..400 {
        if service.status().await.ready >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let served = service.take_ready().await.unwrap();
    assert_eq!(service.frame_path(&served.frame_id).await, Some(served.image_path.clone()));
    assert_eq!(std::fs::read(&served.image_path).unwrap(), b"img");

    // the probe cache was persisted
    assert!(std::fs::read_dir(root.path().join("probe-cache")).unwrap().count() >= 2);
    service.shutdown();
}

#[tokio::test]
#[ignore] // Requires ffmpeg, ImageMagick and FR_TEST_VIDEO
async fn test_real_tools() {
    let Ok(video) = std::env::var("FR_TEST_VIDEO") else {
        eprintln!("FR_TEST_VIDEO not set, skipping");
        return;
    };
    let frames = TempDir::new().unwrap();
    let config = FrameConfig {
        frame_output_dir: frames.path().to_path_buf(),
        image_output_extension: "png".to_string(),
        ..FrameConfig::default()
    };
    let mut parts = ServiceParts::from_config(
        &config,
        vec![EpisodeRecord {
            path: PathBuf::from(video),
            duration_secs: 5.0,
            ..pilot()
        }],
    );
    parts.pool_size = 1;
    parts.cleanup_interval = None;

    let service = FrameRandomizer::with_parts(parts).await.unwrap();
    for _ in 0..600 {
        if service.status().await.ready >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let served = service.take_ready().await.expect("no frame generated");
    assert!(served.image_path.exists());
}
