//! # Archive Handler Protocol
//!
//! An archive handler recognizes a container format on disk and maps its
//! directory into the node tree as a subtree rooted at a
//! [`NodeKind::ArchiveRoot`](crate::NodeKind::ArchiveRoot) node.
//!
//! ```text
//!   mount ──> for each file ──> handler[0].is_archive? ──yes──> map_archive
//!                                      │ no
//!                               handler[1].is_archive? ──yes──> map_archive
//!                                      │ no
//!                                  plain file node
//! ```
//!
//! Handlers are consulted in registration order and the first match wins.
//! A handler owns whatever library state backs the archives it mapped,
//! keyed by the archive root, until `dispose_archive` releases it.

pub mod zip_archive;

use std::path::Path;

use crate::error::VfsResult;
use crate::node::{Node, NodeId, NodeKind, NodeTree, PATH_SEPARATOR};
use crate::reader::FileReader;

/// A pluggable container format.
pub trait ArchiveHandler: Send + Sync {
    /// Short format name for logs.
    fn name(&self) -> &str;

    /// Returns true if the file at `physical_path` is in this handler's
    /// format.
    fn is_archive(&self, physical_path: &Path) -> bool;

    /// Maps the archive at `physical_path` into `tree` under `parent` and
    /// returns the archive root node, named `name`.
    ///
    /// # Errors
    ///
    /// Fails if the archive cannot be opened or its directory is invalid;
    /// no nodes are left in the tree on failure.
    fn map_archive(
        &self,
        name: &str,
        physical_path: &Path,
        parent: Option<NodeId>,
        tree: &mut NodeTree,
    ) -> VfsResult<NodeId>;

    /// Opens entry `entry` of the archive rooted at `archive_root`.
    ///
    /// # Errors
    ///
    /// Fails if the archive is not mapped by this handler or the entry
    /// cannot be read.
    fn open_entry(&self, archive_root: NodeId, entry: usize) -> VfsResult<Box<dyn FileReader>>;

    /// Releases the archive rooted at `archive_root`: removes its nodes from
    /// `tree` and closes the underlying library handle.
    fn dispose_archive(&self, archive_root: NodeId, tree: &mut NodeTree);
}

/// Inserts an archive entry at `entry_path` (`/`-separated, relative to the
/// archive root), creating intermediate folders as needed.
///
/// `entry` is `None` for folder entries. Empty, `.` and `..` segments are
/// skipped. Returns the node for the last segment, or `archive_root` if the
/// path has no usable segments.
pub fn insert_entry(
    tree: &mut NodeTree,
    archive_root: NodeId,
    entry_path: &str,
    entry: Option<usize>,
    size: u64,
) -> NodeId {
    let segments: Vec<&str> = entry_path
        .split(PATH_SEPARATOR)
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    let Some((last, folders)) = segments.split_last() else {
        return archive_root;
    };

    let mut parent = archive_root;
    for folder in folders {
        parent = tree.get_or_insert(
            parent,
            Node::new(*folder, NodeKind::ArchiveEntry { archive: archive_root, entry: None }),
        );
    }

    let kind = NodeKind::ArchiveEntry {
        archive: archive_root,
        entry,
    };
    if entry.is_none() {
        tree.get_or_insert(parent, Node::new(*last, kind))
    } else {
        tree.insert(Some(parent), Node::new(*last, kind).with_size(size))
    }
}
