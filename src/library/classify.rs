use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::index::{LibraryCategory, LibraryIndex};
use super::path_mapper::{map_path, MapMode};
use crate::error::Result;

static SEASON_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^season\D{0,3}\d").expect("season pattern is valid"));

/// Whether a change belongs to a movie or a show.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Show,
}

impl From<LibraryCategory> for MediaKind {
    fn from(category: LibraryCategory) -> Self {
        match category {
            LibraryCategory::Show => MediaKind::Show,
            // other libraries are scanned like movies
            LibraryCategory::Movie | LibraryCategory::Other => MediaKind::Movie,
        }
    }
}

/// `Season 1`, `season01`, `Season_02`, `season-03`...
pub fn is_season_segment(segment: &str) -> bool {
    SEASON_SEGMENT.is_match(segment)
}

/// Classifies a local path by the library it maps into.
///
/// Deleted paths can't be stat'ed, so a `Season N` folder anywhere in the
/// path is taken as a hint for shows. The hint only stands when the owning
/// library is a show library or no library owns the path.
pub fn classify(local: &Path, index: &LibraryIndex, deleted: bool) -> Result<MediaKind> {
    if deleted {
        return classify_deleted(local, index);
    }

    let dir = if local.is_dir() {
        local
    } else {
        local.parent().unwrap_or(local)
    };
    let remote = map_path(dir, index, MapMode::Existing)?;
    Ok(index.find_category(&remote)?.into())
}

fn classify_deleted(local: &Path, index: &LibraryIndex) -> Result<MediaKind> {
    let looks_like_show = local
        .iter()
        .any(|segment| is_season_segment(&segment.to_string_lossy()));
    let remote = map_path(local, index, MapMode::BestEffort)?;

    if looks_like_show {
        return Ok(match index.find_category(&remote) {
            Ok(category) => category.into(),
            Err(_) => MediaKind::Show,
        });
    }

    Ok(index.find_category(&remote)?.into())
}

/// Folder representing one logical media item for a changed file.
///
/// Movies rescan the folder holding the file; shows go one level higher so
/// every episode of a show collapses onto the show folder.
pub fn item_root(file: &Path, kind: MediaKind) -> PathBuf {
    let folder = file.parent().unwrap_or(file);
    match kind {
        MediaKind::Movie => folder.to_path_buf(),
        MediaKind::Show => folder.parent().unwrap_or(folder).to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatcherError;
    use crate::library::index::LibrarySection;
    use crate::library::path_mapper::map_path;

    fn index() -> LibraryIndex {
        LibraryIndex::build(&[
            LibrarySection {
                id: "1".into(),
                title: "Movies".into(),
                category: LibraryCategory::Movie,
                locations: vec!["/data/Movies".into()],
            },
            LibrarySection {
                id: "2".into(),
                title: "TV Shows".into(),
                category: LibraryCategory::Show,
                locations: vec!["/data/TV".into()],
            },
            LibrarySection {
                id: "3".into(),
                title: "Music".into(),
                category: LibraryCategory::Other,
                locations: vec!["/data/Music".into()],
            },
        ])
    }

    #[test]
    fn test_season_segment_pattern() {
        assert!(is_season_segment("Season 1"));
        assert!(is_season_segment("season01"));
        assert!(is_season_segment("SEASON 12"));
        assert!(is_season_segment("Season_01"));
        assert!(is_season_segment("Season.2"));
        assert!(is_season_segment("season-03"));
        assert!(!is_season_segment("Seasons of Love"));
        assert!(!is_season_segment("Specials"));
    }

    #[test]
    fn test_deleted_episode_reduces_to_show_folder() {
        let idx = index();
        let file = Path::new("/mnt/nfs/TV/Breaking Bad/Season 1/S01E01.mkv");

        let kind = classify(file, &idx, true).unwrap();
        assert_eq!(kind, MediaKind::Show);

        let root = item_root(file, kind);
        assert_eq!(root, Path::new("/mnt/nfs/TV/Breaking Bad"));

        let remote = map_path(&root, &idx, MapMode::Deleted).unwrap();
        assert_eq!(remote.to_string(), "/data/TV/Breaking Bad");
    }

    #[test]
    fn test_movie_library_overrides_season_hint() {
        let idx = index();
        let file = Path::new("/mnt/Movies/Season 2 Making Of/clip.mkv");
        assert_eq!(classify(file, &idx, true).unwrap(), MediaKind::Movie);
    }

    #[test]
    fn test_other_library_ignores_season_hint() {
        let idx = index();
        let file = Path::new("/x/Music/Season 1 OST/track.flac");

        let kind = classify(file, &idx, true).unwrap();
        assert_eq!(kind, MediaKind::Movie);
        assert_eq!(item_root(file, kind), Path::new("/x/Music/Season 1 OST"));
    }

    #[test]
    fn test_season_hint_survives_unknown_library() {
        let idx = index();
        let file = Path::new("/elsewhere/Show/Season 3/e1.mkv");
        assert_eq!(classify(file, &idx, true).unwrap(), MediaKind::Show);
    }

    #[test]
    fn test_deleted_without_hint_uses_library() {
        let idx = index();
        assert_eq!(
            classify(Path::new("/x/Music/Album/track.flac"), &idx, true).unwrap(),
            MediaKind::Movie
        );
        assert!(matches!(
            classify(Path::new("/x/Downloads/file.mkv"), &idx, true),
            Err(WatcherError::NoMatchingLibrary(_))
        ));
    }

    #[test]
    fn test_existing_file_classified_by_its_folder() {
        let dir = tempfile::tempdir().unwrap();
        let season = dir.path().join("TV").join("Dark").join("Season 1");
        std::fs::create_dir_all(&season).unwrap();
        let episode = season.join("S01E01.mkv");
        std::fs::write(&episode, b"").unwrap();

        let kind = classify(&episode, &index(), false).unwrap();
        assert_eq!(kind, MediaKind::Show);
        assert_eq!(item_root(&episode, kind), dir.path().join("TV").join("Dark"));
    }

    #[test]
    fn test_movie_item_root_is_containing_folder() {
        let file = Path::new("/media/Movies/Inception (2010)/Inception.mp4");
        assert_eq!(
            item_root(file, MediaKind::Movie),
            Path::new("/media/Movies/Inception (2010)")
        );
    }
}
