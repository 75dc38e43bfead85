//! Integration test for custom archive handlers.

use kiln_vfs::archive::insert_entry;
use kiln_vfs::{
    ArchiveHandler, FileReader, MemoryFileReader, Node, NodeId, NodeKind, NodeTree, Vfs,
    VfsError, VfsResult,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Line-based test format: every `path=contents` line is one file.
#[derive(Default)]
struct PackHandler {
    extension: &'static str,
    archives: Mutex<HashMap<NodeId, Vec<String>>>,
    mapped: AtomicUsize,
}

impl PackHandler {
    fn new(extension: &'static str) -> Self {
        Self {
            extension,
            ..Self::default()
        }
    }
}

impl ArchiveHandler for PackHandler {
    fn name(&self) -> &str {
        self.extension
    }

    fn is_archive(&self, physical_path: &Path) -> bool {
        physical_path.extension().is_some_and(|e| e == self.extension)
    }

    fn map_archive(
        &self,
        name: &str,
        physical_path: &Path,
        parent: Option<NodeId>,
        tree: &mut NodeTree,
    ) -> VfsResult<NodeId> {
        let text = fs::read_to_string(physical_path).map_err(|e| VfsError::InvalidArchive {
            path: physical_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let root = tree.insert(
            parent,
            Node::new(name, NodeKind::ArchiveRoot).with_physical_path(physical_path),
        );
        let mut bodies = Vec::new();
        for line in text.lines() {
            let Some((path, body)) = line.split_once('=') else {
                continue;
            };
            insert_entry(tree, root, path, Some(bodies.len()), body.len() as u64);
            bodies.push(body.to_owned());
        }

        self.archives.lock().insert(root, bodies);
        self.mapped.fetch_add(1, Ordering::SeqCst);
        Ok(root)
    }

    fn open_entry(&self, archive_root: NodeId, entry: usize) -> VfsResult<Box<dyn FileReader>> {
        let archives = self.archives.lock();
        let body = archives
            .get(&archive_root)
            .and_then(|bodies| bodies.get(entry))
            .ok_or(VfsError::StaleNode)?;
        Ok(Box::new(MemoryFileReader::new(body.clone().into_bytes())))
    }

    fn dispose_archive(&self, archive_root: NodeId, tree: &mut NodeTree) {
        self.archives.lock().remove(&archive_root);
        tree.remove_subtree(archive_root);
    }
}

#[test]
fn test_custom_handler_mounts_nested_archives() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("mods")).unwrap();
    fs::write(
        dir.path().join("mods").join("extra.pak"),
        "scripts/init.lua=print(\"hi\")\nreadme.txt=mod\n",
    )
    .unwrap();

    let handler = Arc::new(PackHandler::new("pak"));
    let mut vfs = Vfs::with_default_handlers();
    vfs.register_archive_handler(handler.clone());
    assert_eq!(vfs.handler_count(), 2);
    vfs.mount(dir.path()).unwrap();

    let pak = vfs.get_node("mods/extra.pak").unwrap();
    assert!(vfs.node(pak).unwrap().is_archive());
    assert_eq!(vfs.child_count(pak), 2);

    let mut text = String::new();
    vfs.open_path("mods/extra.pak/scripts/init.lua")
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "print(\"hi\")");

    assert!(vfs.dispose_archive(pak));
    assert!(handler.archives.lock().is_empty());
}

#[test]
fn test_first_registered_handler_wins() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("data.pak"), "a.txt=first\n").unwrap();

    let first = Arc::new(PackHandler::new("pak"));
    let second = Arc::new(PackHandler::new("pak"));
    let mut vfs = Vfs::new();
    vfs.register_archive_handler(first.clone());
    vfs.register_archive_handler(second.clone());
    vfs.mount(dir.path()).unwrap();

    assert_eq!(first.mapped.load(Ordering::SeqCst), 1);
    assert_eq!(second.mapped.load(Ordering::SeqCst), 0);
}

#[test]
fn test_dropping_vfs_releases_archives() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("one.pak"), "a.txt=1\n").unwrap();
    fs::write(dir.path().join("two.pak"), "b.txt=2\n").unwrap();

    let handler = Arc::new(PackHandler::new("pak"));
    {
        let mut vfs = Vfs::new();
        vfs.register_archive_handler(handler.clone());
        vfs.mount(dir.path()).unwrap();
        assert_eq!(handler.archives.lock().len(), 2);
    }
    assert!(handler.archives.lock().is_empty());
}
