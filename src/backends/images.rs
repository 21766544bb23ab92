// ============================================================================
// File: src/backends/images.rs
// ----------------------------------------------------------------------------
// Image resolution: maps a node's image reference to a root filesystem.
// ============================================================================

use std::fmt::Debug;
use std::path::PathBuf;

use crate::backends::errors::{BackendError, BackendResult};
use crate::topology::NodeSpec;

/// Resolves image references before any namespace is created.
pub trait ImageResolver: Send + Sync + Debug {
    /// Root filesystem for `image`, or `None` to run on the host filesystem.
    fn resolve(&self, node: &str, image: &str) -> BackendResult<Option<PathBuf>>;
}

/// Runs every node on the host filesystem and ignores image references.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostImages;

impl ImageResolver for HostImages {
    fn resolve(&self, node: &str, image: &str) -> BackendResult<Option<PathBuf>> {
        log::debug!("node {} runs on host filesystem, ignoring image {}", node, image);
        Ok(None)
    }
}

/// Unpacked root filesystems laid out as `<root>/<name>/<tag>`.
///
/// `name:tag` selects a directory; a bare `name` means tag `latest`.
#[derive(Debug, Clone)]
pub struct DirectoryImages {
    root: PathBuf,
}

impl DirectoryImages {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn split(image: &str) -> Option<(&str, &str)> {
        let (name, tag) = image.rsplit_once(':').unwrap_or((image, "latest"));
        let valid = |part: &str| {
            !part.is_empty() && part != "." && part != ".." && !part.contains('/')
        };
        (valid(name) && valid(tag)).then_some((name, tag))
    }
}

impl ImageResolver for DirectoryImages {
    fn resolve(&self, node: &str, image: &str) -> BackendResult<Option<PathBuf>> {
        let unavailable = |details: String| BackendError::ImageUnavailable {
            node: node.to_string(),
            image: image.to_string(),
            details,
        };

        let (name, tag) = Self::split(image).ok_or_else(|| unavailable("malformed image reference".to_string()))?;
        let path = self.root.join(name).join(tag);
        if !path.is_dir() {
            return Err(unavailable(format!("{} is not a directory", path.display())));
        }
        Ok(Some(path))
    }
}

/// Resolve the image of every node in `nodes`, stopping at the first that
/// cannot be resolved.
pub(crate) fn resolve_all(images: &dyn ImageResolver, nodes: &[NodeSpec]) -> BackendResult<()> {
    for node in nodes {
        if let Some(image) = &node.image {
            images.resolve(&node.name, image)?;
        }
    }
    Ok(())
}
