use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use tracing::info;

use crate::error::{Result, WatcherError};

/// Kind of content a library section holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LibraryCategory {
    Movie,
    Show,
    Other,
}

impl LibraryCategory {
    /// Maps the media server's section type string.
    pub fn from_section_type(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "movie" => Self::Movie,
            "show" => Self::Show,
            _ => Self::Other,
        }
    }
}

/// A library section as reported by the media server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibrarySection {
    pub id: String,
    pub title: String,
    pub category: LibraryCategory,
    pub locations: Vec<String>,
}

/// A path in the media server's namespace, kept as segments.
///
/// Segment casing is preserved; comparisons that need case folding do it
/// explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemotePath {
    absolute: bool,
    segments: Vec<String>,
}

impl RemotePath {
    pub fn parse(raw: &str) -> Self {
        Self {
            absolute: raw.starts_with('/') || raw.starts_with('\\'),
            segments: split_segments(raw).map(str::to_string).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Appends `children` to a copy of this path.
    pub fn join<I, S>(&self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut segments = self.segments.clone();
        segments.extend(children.into_iter().map(Into::into));
        Self {
            absolute: self.absolute,
            segments,
        }
    }

    /// Segment-wise, case-insensitive prefix test.
    pub fn starts_with(&self, prefix: &RemotePath) -> bool {
        prefix.segments.len() <= self.segments.len()
            && prefix
                .segments
                .iter()
                .zip(&self.segments)
                .all(|(a, b)| a.to_lowercase() == b.to_lowercase())
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        }
        f.write_str(&self.segments.join("/"))
    }
}

/// Splits on both separator styles and drops empty segments.
pub fn split_segments(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(['/', '\\']).filter(|s| !s.is_empty())
}

/// One storage location of one library section.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryRoot {
    pub section_id: String,
    pub section_title: String,
    pub path: RemotePath,
    pub category: LibraryCategory,
}

/// Library roots sorted longest first, so nested libraries win over
/// their parents.
#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    roots: Vec<LibraryRoot>,
}

impl LibraryIndex {
    pub fn build(sections: &[LibrarySection]) -> Self {
        let mut roots: Vec<LibraryRoot> = sections
            .iter()
            .flat_map(|section| {
                section.locations.iter().filter_map(move |location| {
                    let path = RemotePath::parse(location);
                    if path.is_empty() {
                        return None;
                    }
                    Some(LibraryRoot {
                        section_id: section.id.clone(),
                        section_title: section.title.clone(),
                        path,
                        category: section.category,
                    })
                })
            })
            .collect();

        // stable: equal lengths keep the server's order
        roots.sort_by_key(|root| Reverse(root.path.segments().len()));

        for root in &roots {
            info!(
                "Found library section: '{}' ({:?}) at {}",
                root.section_title, root.category, root.path
            );
        }

        Self { roots }
    }

    pub fn roots(&self) -> &[LibraryRoot] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// First root (in longest-first order) that `remote_path` lies under.
    pub fn find_root(&self, remote_path: &RemotePath) -> Result<&LibraryRoot> {
        self.roots
            .iter()
            .find(|root| remote_path.starts_with(&root.path))
            .ok_or_else(|| WatcherError::NoMatchingLibrary(remote_path.to_string()))
    }

    pub fn find_category(&self, remote_path: &RemotePath) -> Result<LibraryCategory> {
        self.find_root(remote_path).map(|root| root.category)
    }

    pub fn find_root_id(&self, remote_path: &RemotePath) -> Result<&str> {
        self.find_root(remote_path)
            .map(|root| root.section_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str, category: LibraryCategory, locations: &[&str]) -> LibrarySection {
        LibrarySection {
            id: id.to_string(),
            title: format!("section {}", id),
            category,
            locations: locations.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn test_build_sorts_longest_root_first() {
        let index = LibraryIndex::build(&[
            section("1", LibraryCategory::Movie, &["/data/Movies"]),
            section("2", LibraryCategory::Show, &["/data/Movies/Anime/Series", "/tv"]),
        ]);

        let paths: Vec<String> = index.roots().iter().map(|r| r.path.to_string()).collect();
        assert_eq!(paths, vec!["/data/Movies/Anime/Series", "/data/Movies", "/tv"]);
    }

    #[test]
    fn test_build_emits_one_root_per_location() {
        let index = LibraryIndex::build(&[section(
            "4",
            LibraryCategory::Show,
            &["/tv/a", "/tv/b", ""],
        )]);
        assert_eq!(index.roots().len(), 2);
        assert!(index.roots().iter().all(|r| r.section_id == "4"));
    }

    #[test]
    fn test_find_category_uses_prefix_not_suffix() {
        let index = LibraryIndex::build(&[
            section("1", LibraryCategory::Movie, &["/data/Movies"]),
            section("2", LibraryCategory::Show, &["/data/TV"]),
        ]);

        let show = RemotePath::parse("/data/TV/Breaking Bad");
        assert_eq!(index.find_category(&show).unwrap(), LibraryCategory::Show);
        assert_eq!(index.find_root_id(&show).unwrap(), "2");

        let elsewhere = RemotePath::parse("/mnt/data/TV/Breaking Bad");
        assert!(matches!(
            index.find_category(&elsewhere),
            Err(WatcherError::NoMatchingLibrary(_))
        ));
    }

    #[test]
    fn test_nested_root_owns_its_descendants() {
        let index = LibraryIndex::build(&[
            section("1", LibraryCategory::Movie, &["/media"]),
            section("2", LibraryCategory::Show, &["/media/shows"]),
        ]);
        let path = RemotePath::parse("/media/shows/Dark/Season 1");
        assert_eq!(index.find_root_id(&path).unwrap(), "2");
    }

    #[test]
    fn test_remote_path_display_and_prefix() {
        let path = RemotePath::parse("\\\\nas\\Media//Movies\\");
        assert_eq!(path.to_string(), "/nas/Media/Movies");
        assert!(path.starts_with(&RemotePath::parse("/NAS/media")));
        assert!(!path.starts_with(&RemotePath::parse("/nas/Med")));

        let drive = RemotePath::parse("D:\\Movies").join(["Heat (1995)"]);
        assert_eq!(drive.to_string(), "D:/Movies/Heat (1995)");
    }

    #[test]
    fn test_section_type_mapping() {
        assert_eq!(LibraryCategory::from_section_type("movie"), LibraryCategory::Movie);
        assert_eq!(LibraryCategory::from_section_type("Show"), LibraryCategory::Show);
        assert_eq!(LibraryCategory::from_section_type("artist"), LibraryCategory::Other);
    }
}
