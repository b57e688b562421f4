//! Translation of local filesystem paths into the media server's namespace.
//!
//! The local mount point of a library rarely matches the path the media
//! server sees (`/mnt/nfs/TV/...` locally vs `/data/TV/...` on the server).
//! We align the trailing segments of every library root against a window of
//! the local path and rebuild the path under the root with the largest
//! overlap.

use std::path::{Component, Path, PathBuf};

use super::index::{split_segments, LibraryIndex, LibraryRoot, RemotePath};
use crate::error::{Result, WatcherError};

/// How much the caller knows about the local path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    /// The entity exists: it must be reachable on disk and must map.
    Existing,
    /// The entity was deleted: skip disk checks, but it must still map.
    Deleted,
    /// No validation: fall back to the local path when nothing matches.
    BestEffort,
}

/// Winning root for a local path.
#[derive(Debug, Clone, PartialEq)]
pub struct SuffixMatch<'a> {
    pub root: &'a LibraryRoot,
    /// Number of root segments aligned with the local path.
    pub overlap: usize,
    /// Local segments following the aligned window.
    pub children: Vec<String>,
}

impl SuffixMatch<'_> {
    pub fn remote_path(&self) -> RemotePath {
        self.root.path.join(self.children.iter().cloned())
    }
}

/// Finds the root whose trailing segments overlap the most with a
/// contiguous window of `local`. Equal overlaps keep the earlier root.
pub fn best_match<'a, S: AsRef<str>>(
    local: &[S],
    roots: &'a [LibraryRoot],
) -> Option<SuffixMatch<'a>> {
    let lower: Vec<String> = local.iter().map(|s| s.as_ref().to_lowercase()).collect();
    let mut best: Option<SuffixMatch<'a>> = None;

    for root in roots {
        let root_lower: Vec<String> = root
            .path
            .segments()
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        let max_k = root_lower.len().min(lower.len());

        for k in (1..=max_k).rev() {
            if best.as_ref().is_some_and(|b| b.overlap >= k) {
                break;
            }
            let suffix = &root_lower[root_lower.len() - k..];
            if let Some(idx) = lower.windows(k).position(|window| window == suffix) {
                best = Some(SuffixMatch {
                    root,
                    overlap: k,
                    children: local[idx + k..]
                        .iter()
                        .map(|s| s.as_ref().to_string())
                        .collect(),
                });
                break;
            }
        }
    }

    best
}

/// Pure string form of the mapping, no filesystem access.
pub fn map_str(local: &str, index: &LibraryIndex) -> Option<RemotePath> {
    let segments: Vec<&str> = split_segments(local).collect();
    best_match(&segments, index.roots()).map(|m| m.remote_path())
}

/// Maps `local` into the media server's namespace.
pub fn map_path(local: &Path, index: &LibraryIndex, mode: MapMode) -> Result<RemotePath> {
    if index.is_empty() {
        return Err(WatcherError::NoRootsConfigured);
    }

    let resolved = match mode {
        MapMode::Existing => local.canonicalize().map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => WatcherError::PathNotFound(local.to_path_buf()),
            _ => WatcherError::Io(err),
        })?,
        MapMode::Deleted | MapMode::BestEffort => normalize_lexically(local),
    };

    let raw = resolved.to_string_lossy();
    if let Some(mapped) = map_str(&raw, index) {
        return Ok(mapped);
    }

    match mode {
        MapMode::BestEffort => Ok(RemotePath::parse(&raw)),
        MapMode::Existing | MapMode::Deleted => Err(WatcherError::PathNotMapped {
            path: resolved,
            roots: index.roots().iter().map(|r| r.path.to_string()).collect(),
        }),
    }
}

/// Resolves `.` and `..` without touching the disk; deleted paths can't be
/// canonicalized.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::index::{LibraryCategory, LibrarySection};
    use proptest::prelude::*;

    fn index(roots: &[(&str, &str, LibraryCategory)]) -> LibraryIndex {
        let sections: Vec<LibrarySection> = roots
            .iter()
            .map(|(id, path, category)| LibrarySection {
                id: id.to_string(),
                title: id.to_string(),
                category: *category,
                locations: vec![path.to_string()],
            })
            .collect();
        LibraryIndex::build(&sections)
    }

    fn movies_and_tv() -> LibraryIndex {
        index(&[
            ("1", "/data/Movies", LibraryCategory::Movie),
            ("2", "/data/TV", LibraryCategory::Show),
        ])
    }

    #[test]
    fn test_maps_across_mount_points() {
        let idx = movies_and_tv();
        let mapped = map_str("/mnt/nfs/TV/Breaking Bad/Season 1/S01E01.mkv", &idx).unwrap();
        assert_eq!(mapped.to_string(), "/data/TV/Breaking Bad/Season 1/S01E01.mkv");
    }

    #[test]
    fn test_output_keeps_root_and_local_casing() {
        let idx = movies_and_tv();
        let mapped = map_str("/MNT/movies/Heat (1995)", &idx).unwrap();
        assert_eq!(mapped.to_string(), "/data/Movies/Heat (1995)");
    }

    #[test]
    fn test_nested_root_wins_with_larger_overlap() {
        let idx = index(&[
            ("1", "/srv/media", LibraryCategory::Movie),
            ("2", "/srv/media/anime", LibraryCategory::Show),
        ]);
        let m = best_match(
            &["home", "me", "media", "anime", "Naruto", "ep1.mkv"],
            idx.roots(),
        )
        .unwrap();
        assert_eq!(m.root.section_id, "2");
        assert_eq!(m.overlap, 2);
        assert_eq!(m.remote_path().to_string(), "/srv/media/anime/Naruto/ep1.mkv");
    }

    #[test]
    fn test_tie_keeps_first_root_in_index_order() {
        let idx = index(&[
            ("1", "/a/Videos", LibraryCategory::Movie),
            ("2", "/b/Videos", LibraryCategory::Show),
        ]);
        let m = best_match(&["x", "Videos", "clip.mp4"], idx.roots()).unwrap();
        assert_eq!(m.root.section_id, "1");
    }

    #[test]
    fn test_mapping_a_mapped_path_is_idempotent() {
        let idx = movies_and_tv();
        let once = map_str("/mnt/nfs/TV/Breaking Bad", &idx).unwrap();
        let twice = map_str(&once.to_string(), &idx).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_no_roots_fails_in_every_mode() {
        let empty = LibraryIndex::default();
        for mode in [MapMode::Existing, MapMode::Deleted, MapMode::BestEffort] {
            assert!(matches!(
                map_path(Path::new("/x/y.mkv"), &empty, mode),
                Err(WatcherError::NoRootsConfigured)
            ));
        }
    }

    #[test]
    fn test_unmapped_path_fails_unless_best_effort() {
        let idx = movies_and_tv();
        let local = Path::new("/home/user/Downloads/file.mkv");
        assert!(matches!(
            map_path(local, &idx, MapMode::Deleted),
            Err(WatcherError::PathNotMapped { .. })
        ));
        let fallback = map_path(local, &idx, MapMode::BestEffort).unwrap();
        assert_eq!(fallback.to_string(), "/home/user/Downloads/file.mkv");
    }

    #[test]
    fn test_deleted_mode_skips_existence_check() {
        let idx = movies_and_tv();
        let mapped = map_path(
            Path::new("/gone/TV/Show/./Season 2/../Season 1/e1.mkv"),
            &idx,
            MapMode::Deleted,
        )
        .unwrap();
        assert_eq!(mapped.to_string(), "/data/TV/Show/Season 1/e1.mkv");
    }

    #[test]
    fn test_existing_mode_requires_the_path_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let movie = dir.path().join("Movies").join("Alien (1979)");
        std::fs::create_dir_all(&movie).unwrap();
        let idx = movies_and_tv();

        let mapped = map_path(&movie, &idx, MapMode::Existing).unwrap();
        assert_eq!(mapped.to_string(), "/data/Movies/Alien (1979)");

        let missing = movie.join("missing.mkv");
        assert!(matches!(
            map_path(&missing, &idx, MapMode::Existing),
            Err(WatcherError::PathNotFound(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_case_variation_maps_to_root_plus_children(
            prefix in proptest::collection::vec("[a-z]{1,8}", 0..3),
            children in proptest::collection::vec("[A-Za-z0-9 ]{1,10}", 0..4),
            flips in proptest::collection::vec(any::<bool>(), 2),
        ) {
            let idx = index(&[("1", "/data/Library/Movies", LibraryCategory::Movie)]);
            let mut root_part = vec!["library".to_string(), "movies".to_string()];
            for (seg, upper) in root_part.iter_mut().zip(&flips) {
                if *upper {
                    *seg = seg.to_uppercase();
                }
            }
            let children: Vec<String> = children
                .into_iter()
                .filter(|c| {
                    !c.trim().is_empty()
                        && c.to_lowercase() != "library"
                        && c.to_lowercase() != "movies"
                })
                .collect();
            let prefix: Vec<String> = prefix
                .into_iter()
                .filter(|p| p != "library" && p != "movies" && p != "data")
                .collect();

            let segments: Vec<String> = prefix
                .iter()
                .chain(&root_part)
                .chain(&children)
                .cloned()
                .collect();
            let local = format!("/{}", segments.join("/"));
            let mapped = map_str(&local, &idx).unwrap();
            let expected = RemotePath::parse("/data/Library/Movies").join(children.clone());
            prop_assert_eq!(mapped, expected);
        }
    }
}
