//! Tile path construction.
//!
//! The index never builds paths itself; it asks a [`TilePathResolver`].

use crate::cache::types::TileKey;
use std::path::{Path, PathBuf};

/// Deterministic mapping from a tile key to its backing file.
pub trait TilePathResolver: Send + Sync {
    /// Location of the backing file for `key`.
    fn path_for(&self, key: &TileKey) -> PathBuf;
}

/// Default layout used by [`crate::cache::TileCache`]:
///
/// ```text
/// <root>/<source>/<zoom>/<x>/<y>.tile
/// ```
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use tilecache::cache::{HierarchicalPathResolver, TileKey, TilePathResolver};
///
/// let resolver = HierarchicalPathResolver::new("/cache");
/// let path = resolver.path_for(&TileKey::new("osm", 15, 12754, 5279));
///
/// assert_eq!(path, PathBuf::from("/cache/osm/15/12754/5279.tile"));
/// ```
#[derive(Debug, Clone)]
pub struct HierarchicalPathResolver {
    root: PathBuf,
    extension: String,
}

impl HierarchicalPathResolver {
    /// Create a resolver rooted at `root` using the `.tile` extension.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "tile".to_string(),
        }
    }

    /// Use a different file extension (without the dot), e.g. "png".
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TilePathResolver for HierarchicalPathResolver {
    fn path_for(&self, key: &TileKey) -> PathBuf {
        source_directory(&self.root, &key.source)
            .join(key.zoom.to_string())
            .join(key.x.to_string())
            .join(format!("{}.{}", key.y, self.extension))
    }
}

/// Directory holding every tile of one source.
///
/// ```
/// use std::path::PathBuf;
/// use tilecache::cache::source_directory;
///
/// assert_eq!(source_directory(&PathBuf::from("/cache"), "osm"), PathBuf::from("/cache/osm"));
/// ```
pub fn source_directory(root: &Path, source: &str) -> PathBuf {
    root.join(source)
}
