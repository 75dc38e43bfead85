//! # Virtual File System
//!
//! Mounting, path resolution and enumeration over a [`NodeTree`].
//!
//! The first mount names the root after the mounted directory or archive;
//! later mounts merge into it, folder by folder, with later files replacing
//! earlier ones of the same name. Once mounting is done the `Vfs` is shared
//! by reference and never mutated again.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::zip_archive::ZipArchiveHandler;
use crate::archive::ArchiveHandler;
use crate::error::{VfsError, VfsResult};
use crate::filter::FileFilter;
use crate::node::{Node, NodeId, NodeKind, NodeTree, PATH_SEPARATOR};
use crate::reader::{FileReader, PlainFileReader};

/// Prefix marking the first path segment as an alias.
pub const ALIAS_PREFIX: char = '@';

/// The engine's virtual file system.
#[derive(Default)]
pub struct Vfs {
    /// Every node.
    tree: NodeTree,
    /// Root of the namespace, created by the first mount.
    root: Option<NodeId>,
    /// Archive handlers in detection order.
    handlers: Vec<Arc<dyn ArchiveHandler>>,
    /// Archive root -> index of the handler that mapped it.
    archive_owners: HashMap<NodeId, usize>,
    /// Alias name -> logical path.
    aliases: HashMap<String, String>,
}

impl Vfs {
    /// Creates an empty VFS with no archive handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty VFS with the built-in zip handler registered.
    #[must_use]
    pub fn with_default_handlers() -> Self {
        let mut vfs = Self::new();
        vfs.register_archive_handler(Arc::new(ZipArchiveHandler::new()));
        vfs
    }

    /// Appends a handler. Handlers registered earlier win format conflicts.
    pub fn register_archive_handler(&mut self, handler: Arc<dyn ArchiveHandler>) {
        tracing::debug!("Registered archive handler {}", handler.name());
        self.handlers.push(handler);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Underlying node arena.
    #[inline]
    #[must_use]
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// Root node, once something is mounted.
    #[inline]
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Looks up a live node.
    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.tree.get(id)
    }

    /// Mounts a directory or a recognized archive file.
    ///
    /// Returns the root node. Inside a directory, an archive its handler
    /// cannot map is mounted as a plain file, and a folder linking back to
    /// one it is nested in is skipped.
    ///
    /// # Errors
    ///
    /// - [`VfsError::InvalidFile`] if `physical_path` is neither a directory
    ///   nor a recognized archive
    /// - [`VfsError::Io`] if a directory cannot be read
    /// - any error from the archive handler when `physical_path` is itself
    ///   an archive; the tree is left unchanged
    pub fn mount(&mut self, physical_path: &Path) -> VfsResult<NodeId> {
        let metadata = fs::metadata(physical_path).map_err(|e| VfsError::io(physical_path, e))?;
        let name = physical_path
            .file_name()
            .map_or_else(
                || physical_path.display().to_string(),
                |n| n.to_string_lossy().into_owned(),
            );

        if metadata.is_dir() {
            let root = match self.root {
                Some(root) => root,
                None => {
                    let root = self.tree.insert(
                        None,
                        Node::new(name, NodeKind::PlainFolder).with_physical_path(physical_path),
                    );
                    self.root = Some(root);
                    root
                }
            };
            let top = fs::canonicalize(physical_path).map_err(|e| VfsError::io(physical_path, e))?;
            self.scan_directory(root, physical_path, &mut vec![top])?;
            tracing::info!("Mounted {} ({} nodes)", physical_path.display(), self.tree.len());
            return Ok(root);
        }

        let Some(handler) = self.find_handler(physical_path) else {
            return Err(VfsError::InvalidFile(physical_path.display().to_string()));
        };
        let node = self.map_archive(handler, &name, physical_path, self.root)?;
        let root = *self.root.get_or_insert(node);
        tracing::info!("Mounted archive {} ({} nodes)", physical_path.display(), self.tree.len());
        Ok(root)
    }

    fn find_handler(&self, physical_path: &Path) -> Option<usize> {
        self.handlers.iter().position(|h| h.is_archive(physical_path))
    }

    /// Maps the archive detached, then swaps it in for any same-name node
    /// under `parent`. A failed mapping leaves the tree as it was.
    fn map_archive(
        &mut self,
        handler: usize,
        name: &str,
        physical_path: &Path,
        parent: Option<NodeId>,
    ) -> VfsResult<NodeId> {
        let archive = Arc::clone(&self.handlers[handler]);
        let root = archive.map_archive(name, physical_path, None, &mut self.tree)?;
        self.archive_owners.insert(root, handler);
        if let Some(displaced) = parent.and_then(|p| self.tree.attach(p, root)) {
            self.release_subtree(displaced);
        }
        Ok(root)
    }

    /// `ancestors` holds the canonical paths of the directories being
    /// scanned, so a link back to one of them is skipped.
    fn scan_directory(
        &mut self,
        folder: NodeId,
        dir: &Path,
        ancestors: &mut Vec<PathBuf>,
    ) -> VfsResult<()> {
        let entries = fs::read_dir(dir).map_err(|e| VfsError::io(dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| VfsError::io(dir, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = fs::metadata(&path).map_err(|e| VfsError::io(&path, e))?;

            if metadata.is_dir() {
                let canonical = fs::canonicalize(&path).map_err(|e| VfsError::io(&path, e))?;
                if ancestors.contains(&canonical) {
                    tracing::warn!("Skipping {}: links back to an enclosing folder", path.display());
                    continue;
                }
                let existing = self
                    .tree
                    .child(folder, &name)
                    .filter(|id| self.tree.get(*id).is_some_and(|n| n.kind() == NodeKind::PlainFolder));
                let child = match existing {
                    Some(child) => child,
                    None => {
                        self.release_child(folder, &name);
                        self.tree.insert(
                            Some(folder),
                            Node::new(name, NodeKind::PlainFolder).with_physical_path(&path),
                        )
                    }
                };
                ancestors.push(canonical);
                let scanned = self.scan_directory(child, &path, ancestors);
                ancestors.pop();
                scanned?;
            } else if let Some(handler) = self.find_handler(&path) {
                if let Err(e) = self.map_archive(handler, &name, &path, Some(folder)) {
                    tracing::warn!("Mounting {} as a plain file: {e}", path.display());
                    self.insert_plain_file(folder, name, &path, metadata.len());
                }
            } else {
                self.insert_plain_file(folder, name, &path, metadata.len());
            }
        }
        Ok(())
    }

    fn insert_plain_file(&mut self, folder: NodeId, name: String, path: &Path, size: u64) {
        self.release_child(folder, &name);
        self.tree.insert(
            Some(folder),
            Node::new(name, NodeKind::PlainFile)
                .with_physical_path(path)
                .with_size(size),
        );
    }

    fn release_child(&mut self, folder: NodeId, name: &str) {
        if let Some(existing) = self.tree.child(folder, name) {
            self.release_subtree(existing);
        }
    }

    /// Removes a subtree, letting each archive handler release the archives
    /// mapped inside it.
    fn release_subtree(&mut self, id: NodeId) {
        let archives: Vec<NodeId> = self
            .tree
            .descendants(id)
            .filter(|n| self.archive_owners.contains_key(n))
            .collect();
        for archive in archives.into_iter().rev() {
            self.dispose_archive(archive);
        }
        self.tree.remove_subtree(id);
        if self.root == Some(id) {
            self.root = None;
        }
    }

    /// Releases an archive: its nodes leave the tree and its handler closes
    /// the library handle.
    ///
    /// Returns false if `archive_root` is not a mapped archive.
    pub fn dispose_archive(&mut self, archive_root: NodeId) -> bool {
        let Some(handler) = self.archive_owners.remove(&archive_root) else {
            return false;
        };
        let nested: Vec<NodeId> = self
            .tree
            .descendants(archive_root)
            .filter(|n| *n != archive_root && self.archive_owners.contains_key(n))
            .collect();
        for inner in nested {
            self.dispose_archive(inner);
        }
        self.handlers[handler].dispose_archive(archive_root, &mut self.tree);
        if self.root == Some(archive_root) {
            self.root = None;
        }
        true
    }

    /// Exact, case-sensitive child lookup. Filters do not apply.
    #[must_use]
    pub fn get_child(&self, node: NodeId, name: &str) -> Option<NodeId> {
        self.tree.child(node, name)
    }

    /// Number of children of `node`.
    #[must_use]
    pub fn child_count(&self, node: NodeId) -> usize {
        self.tree.get(node).map_or(0, Node::child_count)
    }

    /// Copies the children of `node` accepted by `filter` into `buffer`, in
    /// name order.
    ///
    /// Returns the number of children written. Call with an empty buffer to
    /// learn the required size.
    ///
    /// # Errors
    ///
    /// - [`VfsError::BufferTooSmall`] with the match count if `buffer` is
    ///   shorter than it; nothing is written
    /// - [`VfsError::StaleNode`] if `node` no longer exists
    pub fn copy_children(
        &self,
        node: NodeId,
        filter: Option<&dyn FileFilter>,
        buffer: &mut [NodeId],
    ) -> VfsResult<usize> {
        let node = self.tree.get(node).ok_or(VfsError::StaleNode)?;
        let accepted = |name: &str| filter.map_or(true, |f| f.accept(name));

        let required = node.children().filter(|&(name, _)| accepted(name)).count();
        if required > buffer.len() {
            return Err(VfsError::BufferTooSmall { required });
        }

        let matches = node.children().filter(|&(name, _)| accepted(name));
        for (slot, (_, child)) in buffer.iter_mut().zip(matches) {
            *slot = child;
        }
        Ok(required)
    }

    /// Children of `node` accepted by `filter`, in name order.
    #[must_use]
    pub fn children(&self, node: NodeId, filter: Option<&dyn FileFilter>) -> Vec<NodeId> {
        self.tree.get(node).map_or_else(Vec::new, |n| {
            n.children()
                .filter(|&(name, _)| filter.map_or(true, |f| f.accept(name)))
                .map(|(_, id)| id)
                .collect()
        })
    }

    /// Cached logical path of `node`; empty for the root.
    #[must_use]
    pub fn logical_path(&self, node: NodeId) -> Option<&str> {
        self.tree.logical_path(node)
    }

    /// Registers `alias` so that `@alias/rest` resolves as
    /// `logical_path/rest`.
    pub fn add_alias(&mut self, alias: &str, logical_path: &str) {
        let alias = alias.trim_start_matches(ALIAS_PREFIX);
        self.aliases.insert(alias.to_owned(), logical_path.to_owned());
    }

    /// Resolves a `/`-separated logical path from the root. The first
    /// segment may be an `@alias`. The empty path resolves to the root.
    #[must_use]
    pub fn get_node(&self, path: &str) -> Option<NodeId> {
        let mut segments = path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()).peekable();

        let mut current = match segments.peek().and_then(|s| s.strip_prefix(ALIAS_PREFIX)) {
            Some(alias) => {
                let target = self.aliases.get(alias)?;
                segments.next();
                self.get_node(target.trim_start_matches(ALIAS_PREFIX))?
            }
            None => self.root?,
        };

        for segment in segments {
            current = self.tree.child(current, segment)?;
        }
        Some(current)
    }

    /// Opens a file node for reading.
    ///
    /// # Errors
    ///
    /// - [`VfsError::StaleNode`] if `node` no longer exists
    /// - [`VfsError::InvalidFile`] if `node` is a folder
    /// - any error from the disk or the archive handler
    pub fn open(&self, node: NodeId) -> VfsResult<Box<dyn FileReader>> {
        let entry = self.tree.get(node).ok_or(VfsError::StaleNode)?;

        match entry.kind() {
            NodeKind::PlainFile => {
                let path = entry
                    .physical_path()
                    .ok_or_else(|| VfsError::InvalidFile(entry.name().to_owned()))?;
                Ok(Box::new(PlainFileReader::open(path)?))
            }
            NodeKind::ArchiveEntry {
                archive,
                entry: Some(index),
            } => {
                let handler = self.archive_owners.get(&archive).ok_or(VfsError::StaleNode)?;
                self.handlers[*handler].open_entry(archive, index)
            }
            NodeKind::PlainFolder | NodeKind::ArchiveRoot | NodeKind::ArchiveEntry { entry: None, .. } => {
                Err(VfsError::InvalidFile(entry.name().to_owned()))
            }
        }
    }

    /// Opens the file at a logical path.
    ///
    /// # Errors
    ///
    /// [`VfsError::NotFound`] if nothing exists at `path`, otherwise as
    /// [`Vfs::open`].
    pub fn open_path(&self, path: &str) -> VfsResult<Box<dyn FileReader>> {
        let node = self.get_node(path).ok_or_else(|| VfsError::NotFound(path.to_owned()))?;
        self.open(node)
    }
}

impl Drop for Vfs {
    fn drop(&mut self) {
        let archives: Vec<NodeId> = self.archive_owners.keys().copied().collect();
        for archive in archives {
            self.dispose_archive(archive);
        }
    }
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("root", &self.root)
            .field("nodes", &self.tree.len())
            .field("handlers", &self.handlers.len())
            .field("archives", &self.archive_owners.len())
            .finish()
    }
}
