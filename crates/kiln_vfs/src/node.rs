//! # Node Tree
//!
//! Arena of VFS nodes addressed by generation-checked handles.
//!
//! Slots are recycled through a free list. Each reuse bumps the slot's
//! generation, so a [`NodeId`] kept past a dispose resolves to `None`
//! instead of silently aliasing whatever node took its slot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Separator between logical path segments.
pub const PATH_SEPARATOR: &str = "/";

/// Handle to a node in a [`NodeTree`].
///
/// `NodeId::default()` never refers to a live node and may be used to fill
/// enumeration buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    /// Slot index.
    index: u32,
    /// Slot generation at creation; live generations start at 1.
    generation: u32,
}

/// What a node is backed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// File on disk.
    PlainFile,
    /// Directory on disk.
    PlainFolder,
    /// Root of a mapped archive. Behaves as a folder.
    ArchiveRoot,
    /// Node inside an archive.
    ArchiveEntry {
        /// Root node of the owning archive.
        archive: NodeId,
        /// Handler-specific entry index, `None` for folders.
        entry: Option<usize>,
    },
}

/// One file or folder in the tree.
#[derive(Debug)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    kind: NodeKind,
    physical_path: Option<PathBuf>,
    size: u64,
    /// Allocated on first child insert.
    children: Option<BTreeMap<String, NodeId>>,
    /// Built on first request.
    logical_path: OnceLock<String>,
}

impl Node {
    /// Creates a detached node description for [`NodeTree::insert`].
    #[must_use]
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            parent: None,
            kind,
            physical_path: None,
            size: 0,
            children: None,
            logical_path: OnceLock::new(),
        }
    }

    /// Sets the uncompressed size in bytes.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Sets the backing path on disk.
    #[must_use]
    pub fn with_physical_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.physical_path = Some(path.into());
        self
    }

    /// Node name; unique among its siblings.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent node, `None` for roots.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Backing kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Physical path for disk-backed nodes and archive roots.
    #[inline]
    #[must_use]
    pub fn physical_path(&self) -> Option<&Path> {
        self.physical_path.as_deref()
    }

    /// File size in bytes; zero for folders.
    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns true for nodes that can have children.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::PlainFolder | NodeKind::ArchiveRoot | NodeKind::ArchiveEntry { entry: None, .. }
        )
    }

    /// Returns true for archive roots.
    #[must_use]
    pub fn is_archive(&self) -> bool {
        self.kind == NodeKind::ArchiveRoot
    }

    /// Number of children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.as_ref().map_or(0, BTreeMap::len)
    }

    /// Iterates `(name, child)` pairs in name order.
    pub fn children(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.children
            .iter()
            .flat_map(|map| map.iter().map(|(name, id)| (name.as_str(), *id)))
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena owning every node of one VFS.
#[derive(Debug, Default)]
pub struct NodeTree {
    /// Node storage.
    slots: Vec<Slot>,
    /// Indices of empty slots.
    free_list: Vec<u32>,
    /// Number of live nodes.
    live: usize,
}

impl NodeTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if the tree holds no nodes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Looks up a live node.
    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation == id.generation {
            slot.node.as_ref()
        } else {
            None
        }
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation == id.generation {
            slot.node.as_mut()
        } else {
            None
        }
    }

    /// Inserts `node` under `parent` (or as a detached root).
    ///
    /// A sibling with the same name is removed together with its subtree.
    /// A stale `parent` inserts the node as a root.
    pub fn insert(&mut self, parent: Option<NodeId>, mut node: Node) -> NodeId {
        let parent = parent.filter(|p| self.get(*p).is_some());
        node.parent = parent;
        let name = node.name.clone();

        let id = match self.free_list.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1).max(1);
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
                self.slots.push(Slot {
                    generation: 1,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 1,
                }
            }
        };
        self.live += 1;

        if let Some(parent_id) = parent {
            let replaced = self
                .get_mut(parent_id)
                .and_then(|p| p.children.get_or_insert_with(BTreeMap::new).insert(name, id));
            if let Some(old) = replaced {
                self.remove_subtree(old);
            }
        }
        id
    }

    /// Makes the detached node `id` a child of `parent` under its own name.
    ///
    /// Returns the sibling it displaced, still allocated, for the caller to
    /// release. Stale handles and nodes that already have a parent are left
    /// alone.
    pub fn attach(&mut self, parent: NodeId, id: NodeId) -> Option<NodeId> {
        self.get(parent)?;
        let node = self.get_mut(id)?;
        if node.parent.is_some() {
            return None;
        }
        node.parent = Some(parent);
        let name = node.name.clone();
        self.get_mut(parent)?
            .children
            .get_or_insert_with(BTreeMap::new)
            .insert(name, id)
    }

    /// Returns the child named `name`, or inserts `node` under that name.
    pub fn get_or_insert(&mut self, parent: NodeId, node: Node) -> NodeId {
        match self.child(parent, &node.name) {
            Some(existing) => existing,
            None => self.insert(Some(parent), node),
        }
    }

    /// Exact, case-sensitive child lookup.
    #[must_use]
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.get(parent)?.children.as_ref()?.get(name).copied()
    }

    /// Detaches `id` from its parent and frees it and all descendants.
    ///
    /// Returns the number of nodes freed; zero for a stale handle.
    pub fn remove_subtree(&mut self, id: NodeId) -> usize {
        let Some(node) = self.get(id) else {
            return 0;
        };
        let parent = node.parent;
        let name = node.name.clone();

        if let Some(children) = parent
            .and_then(|p| self.get_mut(p))
            .and_then(|p| p.children.as_mut())
        {
            if children.get(&name) == Some(&id) {
                children.remove(&name);
            }
        }

        let mut removed = 0;
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let slot = &mut self.slots[next.index as usize];
            if let Some(node) = slot.node.take() {
                pending.extend(node.children.into_iter().flat_map(BTreeMap::into_values));
                self.free_list.push(next.index);
                self.live -= 1;
                removed += 1;
            }
        }
        removed
    }

    /// Logical path of `id`: segment names from below the root down to the
    /// node, joined with `/`. A root's path is empty.
    ///
    /// Built once per node and cached for the node's lifetime.
    #[must_use]
    pub fn logical_path(&self, id: NodeId) -> Option<&str> {
        let node = self.get(id)?;
        Some(node.logical_path.get_or_init(|| self.build_logical_path(node)).as_str())
    }

    fn build_logical_path(&self, node: &Node) -> String {
        let mut segments = Vec::new();
        let mut current = node;
        while let Some(parent) = current.parent.and_then(|p| self.get(p)) {
            segments.push(current.name.as_str());
            current = parent;
        }
        segments.reverse();
        segments.join(PATH_SEPARATOR)
    }

    /// Iterates every node in the subtree rooted at `id`, depth first,
    /// including `id` itself.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut pending = if self.get(id).is_some() { vec![id] } else { Vec::new() };
        std::iter::from_fn(move || {
            let next = pending.pop()?;
            if let Some(node) = self.get(next) {
                let mut children: Vec<NodeId> = node.children().map(|(_, c)| c).collect();
                children.reverse();
                pending.extend(children);
            }
            Some(next)
        })
    }
}
