/// Video index building: show metadata joined to discovered files and probed durations
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use frame_randomizer_common::{
    season_episode_tag, EpisodeRecord, FrameConfig, IndexError, IndexResult, ShowEpisode,
};

pub mod discovery;
pub mod probe;

pub use discovery::{discover_videos, parse_season_episode, VideoFile};
pub use probe::{parse_duration_output, FfprobeProber, ProbeCache, Prober};

/// Options controlling discovery and the metadata join
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub video_source_dir: PathBuf,
    pub recursive: bool,
    pub extensions: Vec<String>,
    pub allow_missing: bool,
}

impl IndexOptions {
    #[must_use]
    pub fn from_config(config: &FrameConfig) -> Self {
        Self {
            video_source_dir: config.video_source_dir.clone(),
            recursive: config.search_video_dir_recursively,
            extensions: config.video_file_extensions.clone(),
            allow_missing: config.allow_missing_episodes,
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ShowData {
    Wrapped { episodes: Vec<ShowEpisode> },
    Bare(Vec<ShowEpisode>),
}

/// Load episode metadata from a JSON file.
///
/// Accepts `{"episodes": [...]}` or a bare array of
/// `{season, episode, name, overview}` objects.
pub async fn load_show_data(path: &Path) -> IndexResult<Vec<ShowEpisode>> {
    let contents = tokio::fs::read(path).await?;
    let data: ShowData = serde_json::from_slice(&contents)
        .map_err(|e| IndexError::Metadata(format!("{}: {e}", path.display())))?;
    let episodes = match data {
        ShowData::Wrapped { episodes } | ShowData::Bare(episodes) => episodes,
    };
    if let Some(bad) = episodes.iter().find(|ep| ep.season == 0 || ep.episode == 0) {
        return Err(IndexError::Metadata(format!(
            "season and episode numbers must be positive, got {}",
            season_episode_tag(bad.season, bad.episode)
        )));
    }
    Ok(episodes)
}

/// Join show metadata to files by (season, episode).
///
/// Unmatched metadata is dropped with a warning when `allow_missing` is set;
/// otherwise the first unmatched record fails the join.
pub fn join_episodes(
    episodes: &[ShowEpisode],
    files: &[VideoFile],
    allow_missing: bool,
) -> IndexResult<Vec<(ShowEpisode, PathBuf)>> {
    let by_episode: HashMap<(u32, u32), &PathBuf> = files
        .iter()
        .map(|file| ((file.season, file.episode), &file.path))
        .collect();

    let mut joined = Vec::with_capacity(episodes.len());
    for episode in episodes {
        match by_episode.get(&(episode.season, episode.episode)) {
            Some(path) => joined.push((episode.clone(), (*path).clone())),
            None => {
                let err = IndexError::MissingEpisode {
                    season: episode.season,
                    episode: episode.episode,
                };
                if allow_missing {
                    warn!("{}", err);
                } else {
                    return Err(err);
                }
            }
        }
    }
    Ok(joined)
}

/// Build the episode index: discover files, join metadata, resolve durations.
///
/// Durations are resolved concurrently through `probes`, which applies the
/// cache and the probe concurrency limit.
pub async fn build_index(
    episodes: &[ShowEpisode],
    options: &IndexOptions,
    probes: &ProbeCache,
) -> IndexResult<Vec<EpisodeRecord>> {
    let dir = options.video_source_dir.clone();
    let recursive = options.recursive;
    let extensions = options.extensions.clone();
    let files = tokio::task::spawn_blocking(move || discover_videos(&dir, recursive, &extensions))
        .await
        .map_err(|e| IndexError::Io(std::io::Error::other(e)))??;
    info!(
        "Discovered {} video files in {:?}",
        files.len(),
        options.video_source_dir
    );

    let joined = join_episodes(episodes, &files, options.allow_missing)?;

    let mut tasks = tokio::task::JoinSet::new();
    for (episode, path) in joined {
        let probes = probes.clone();
        tasks.spawn(async move {
            let duration = probes.duration(&path).await;
            (episode, path, duration)
        });
    }

    let mut records = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let (episode, path, duration) =
            joined.map_err(|e| IndexError::Io(std::io::Error::other(e)))?;
        match duration {
            Ok(duration_secs) => records.push(EpisodeRecord {
                season: episode.season,
                episode: episode.episode,
                name: episode.name,
                overview: episode.overview,
                path,
                duration_secs,
            }),
            Err(e) if options.allow_missing => {
                warn!(
                    "Dropping {}: {}",
                    season_episode_tag(episode.season, episode.episode),
                    e
                );
            }
            Err(e) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    records.sort_by_key(|record| (record.season, record.episode));
    info!("Indexed {} episodes", records.len());
    Ok(records)
}
