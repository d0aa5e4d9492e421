//! Video file discovery and season/episode parsing from file names

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// "S01E02", "s1.e2", "Season 1 Episode 2", "S01 - E02"
static SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)s(?:eason)?[ ._-]*(\d{1,3})[ ._-]*e(?:p(?:isode)?)?[ ._-]*(\d{1,4})")
        .expect("season/episode pattern is valid")
});

/// "1x02", "01x02"; the digit bounds keep resolutions like 1920x1080 out
static CROSS_NOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\D)(\d{1,3})x(\d{1,4})(?:\D|$)").expect("cross pattern is valid")
});

/// "01.02", "1-02", "1_02", "01,02", "S01.02", "Season 1 02"; one separator
/// between the numbers, and a number must start a word
static SEPARATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])(?:s(?:eason)?[ ._-]*)?(\d{1,3})[ ._,-](\d{1,4})(?:\D|$)")
        .expect("separated pattern is valid")
});

/// A discovered video file with the episode parsed from its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFile {
    pub season: u32,
    pub episode: u32,
    pub path: PathBuf,
}

/// Parse (season, episode) from a file name. Directory components are not
/// considered.
#[must_use]
pub fn parse_season_episode(file_name: &str) -> Option<(u32, u32)> {
    let captures = SEASON_EPISODE
        .captures(file_name)
        .or_else(|| CROSS_NOTATION.captures(file_name))
        .or_else(|| SEPARATED.captures(file_name))?;
    let season = captures.get(1)?.as_str().parse().ok()?;
    let episode = captures.get(2)?.as_str().parse().ok()?;
    Some((season, episode))
}

fn has_video_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
}

/// Find video files under `dir` whose names carry a season/episode number.
///
/// Files that don't match are ignored. When several files map to the same
/// episode, the first in path order wins.
pub fn discover_videos(
    dir: &Path,
    recursive: bool,
    extensions: &[String],
) -> std::io::Result<Vec<VideoFile>> {
    let mut walker = WalkDir::new(dir).follow_links(true).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut seen: HashMap<(u32, u32), PathBuf> = HashMap::new();
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop while scanning videos"))
        })?;
        if !entry.file_type().is_file() || !has_video_extension(entry.path(), extensions) {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        let Some((season, episode)) = parse_season_episode(file_name) else {
            debug!("Ignoring unrecognized video file name: {:?}", entry.path());
            continue;
        };

        if let Some(existing) = seen.get(&(season, episode)) {
            debug!(
                "Duplicate file for S{:02}E{:02}: keeping {:?}, ignoring {:?}",
                season,
                episode,
                existing,
                entry.path()
            );
            continue;
        }
        seen.insert((season, episode), entry.path().to_path_buf());
        files.push(VideoFile {
            season,
            episode,
            path: entry.into_path(),
        });
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn extensions() -> Vec<String> {
        vec!["mkv".to_string(), "mp4".to_string()]
    }

    #[test]
    fn test_parse_standard_notation() {
        assert_eq!(parse_season_episode("Show.S01E02.1080p.mkv"), Some((1, 2)));
        assert_eq!(parse_season_episode("show s3e14.mp4"), Some((3, 14)));
        assert_eq!(parse_season_episode("Show - S02 - E05 - Title.mkv"), Some((2, 5)));
        assert_eq!(
            parse_season_episode("Show Season 1 Episode 10.mkv"),
            Some((1, 10))
        );
    }

    #[test]
    fn test_parse_cross_notation() {
        assert_eq!(parse_season_episode("Show 1x02 Title.mkv"), Some((1, 2)));
        assert_eq!(parse_season_episode("10x103.mp4"), Some((10, 103)));
    }

    #[test]
    fn test_parse_single_separator_notation() {
        assert_eq!(parse_season_episode("Show 01.02.mkv"), Some((1, 2)));
        assert_eq!(parse_season_episode("Show 1-02.mkv"), Some((1, 2)));
        assert_eq!(parse_season_episode("Show 01,02.mkv"), Some((1, 2)));
        assert_eq!(parse_season_episode("Show S01.02.mkv"), Some((1, 2)));
        assert_eq!(parse_season_episode("Show_1_02.mkv"), Some((1, 2)));
        assert_eq!(parse_season_episode("Show S01 02.mkv"), Some((1, 2)));
        assert_eq!(parse_season_episode("4.113 Title.mp4"), Some((4, 113)));
    }

    #[test]
    fn test_parse_rejects_resolution_and_plain_names() {
        assert_eq!(parse_season_episode("Movie 1920x1080.mkv"), None);
        assert_eq!(parse_season_episode("Behind the scenes.mkv"), None);
        assert_eq!(parse_season_episode("Movie 2019.mkv"), None);
        assert_eq!(parse_season_episode("Movie 2019-05.mkv"), None);
        assert_eq!(parse_season_episode("Show 720p.mkv"), None);
    }

    #[test]
    fn test_discover_filters_and_recurses() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("Season 2");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("Show S01E01.mkv"), b"x").unwrap();
        std::fs::write(dir.path().join("Show S01E02.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("Extras.mkv"), b"x").unwrap();
        std::fs::write(nested.join("Show 2x03.MP4"), b"x").unwrap();

        let recursive = discover_videos(dir.path(), true, &extensions()).unwrap();
        let mut found: Vec<(u32, u32)> = recursive.iter().map(|f| (f.season, f.episode)).collect();
        found.sort_unstable();
        assert_eq!(found, vec![(1, 1), (2, 3)]);

        let flat = discover_videos(dir.path(), false, &extensions()).unwrap();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].path, dir.path().join("Show S01E01.mkv"));
    }

    #[test]
    fn test_discover_keeps_first_duplicate() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a S01E01.mkv"), b"x").unwrap();
        std::fs::write(dir.path().join("b S01E01.mkv"), b"x").unwrap();

        let files = discover_videos(dir.path(), true, &extensions()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, dir.path().join("a S01E01.mkv"));
    }
}
