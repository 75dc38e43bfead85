//! # Zip Archive Handler
//!
//! Built-in handler for `.zip` files. The central directory is read once at
//! mount time; entry data is decompressed into memory when a file is opened.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use parking_lot::Mutex;
use zip::ZipArchive;

use super::{insert_entry, ArchiveHandler};
use crate::error::{VfsError, VfsResult};
use crate::node::{Node, NodeId, NodeKind, NodeTree};
use crate::reader::{FileReader, MemoryFileReader};

/// Largest entry the handler will map.
pub const MAX_ENTRY_SIZE: u64 = u32::MAX as u64;

type OpenArchive = ZipArchive<BufReader<File>>;

/// Maps zip files into the VFS.
#[derive(Default)]
pub struct ZipArchiveHandler {
    /// Open archives keyed by their root node.
    archives: Mutex<HashMap<NodeId, OpenArchive>>,
}

impl ZipArchiveHandler {
    /// Creates a handler with no open archives.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archives currently open.
    #[must_use]
    pub fn open_archives(&self) -> usize {
        self.archives.lock().len()
    }

    fn map_entries(archive: &mut OpenArchive, root: NodeId, tree: &mut NodeTree) -> VfsResult<()> {
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index).map_err(|e| VfsError::InvalidArchiveFile {
                name: format!("#{index}"),
                reason: e.to_string(),
            })?;

            if entry.is_dir() {
                insert_entry(tree, root, entry.name(), None, 0);
                continue;
            }
            if entry.size() > MAX_ENTRY_SIZE {
                return Err(VfsError::ArchiveFileTooLarge {
                    name: entry.name().to_owned(),
                    size: entry.size(),
                });
            }
            insert_entry(tree, root, entry.name(), Some(index), entry.size());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ZipArchiveHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchiveHandler")
            .field("open_archives", &self.open_archives())
            .finish()
    }
}

impl ArchiveHandler for ZipArchiveHandler {
    fn name(&self) -> &str {
        "zip"
    }

    fn is_archive(&self, physical_path: &Path) -> bool {
        physical_path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
    }

    fn map_archive(
        &self,
        name: &str,
        physical_path: &Path,
        parent: Option<NodeId>,
        tree: &mut NodeTree,
    ) -> VfsResult<NodeId> {
        let file = File::open(physical_path).map_err(|e| VfsError::io(physical_path, e))?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| VfsError::InvalidArchive {
            path: physical_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let root = tree.insert(
            parent,
            Node::new(name, NodeKind::ArchiveRoot).with_physical_path(physical_path),
        );
        if let Err(e) = Self::map_entries(&mut archive, root, tree) {
            tree.remove_subtree(root);
            return Err(e);
        }

        tracing::debug!(
            "Mapped zip {} ({} entries)",
            physical_path.display(),
            archive.len()
        );
        self.archives.lock().insert(root, archive);
        Ok(root)
    }

    fn open_entry(&self, archive_root: NodeId, entry: usize) -> VfsResult<Box<dyn FileReader>> {
        let mut archives = self.archives.lock();
        let archive = archives.get_mut(&archive_root).ok_or(VfsError::StaleNode)?;

        let mut file = archive.by_index(entry).map_err(|e| VfsError::InvalidArchiveFile {
            name: format!("#{entry}"),
            reason: e.to_string(),
        })?;
        let name = file.name().to_owned();
        let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut data).map_err(|e| VfsError::InvalidArchiveFile {
            name,
            reason: e.to_string(),
        })?;

        Ok(Box::new(MemoryFileReader::new(data)))
    }

    fn dispose_archive(&self, archive_root: NodeId, tree: &mut NodeTree) {
        self.archives.lock().remove(&archive_root);
        tree.remove_subtree(archive_root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(body.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_detects_by_extension() {
        let handler = ZipArchiveHandler::new();
        assert!(handler.is_archive(Path::new("a/b/pack.zip")));
        assert!(handler.is_archive(Path::new("PACK.ZIP")));
        assert!(!handler.is_archive(Path::new("pack.zip.txt")));
        assert!(!handler.is_archive(Path::new("zip")));
    }

    #[test]
    fn test_map_open_dispose() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.zip");
        write_zip(&path, &[("empty/", ""), ("a/b.txt", "bee"), ("c.txt", "sea")]);

        let handler = ZipArchiveHandler::new();
        let mut tree = NodeTree::new();
        let root = handler.map_archive("pack.zip", &path, None, &mut tree).unwrap();

        assert_eq!(handler.open_archives(), 1);
        assert_eq!(tree.get(root).unwrap().child_count(), 3);
        let a = tree.child(root, "a").unwrap();
        assert!(tree.get(a).unwrap().is_folder());
        let b = tree.child(a, "b.txt").unwrap();
        assert_eq!(tree.get(b).unwrap().size(), 3);

        let NodeKind::ArchiveEntry { entry: Some(index), .. } = tree.get(b).unwrap().kind() else {
            panic!("b.txt should be an archive file");
        };
        let mut reader = handler.open_entry(root, index).unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "bee");

        handler.dispose_archive(root, &mut tree);
        assert_eq!(handler.open_archives(), 0);
        assert!(tree.is_empty());
        assert!(matches!(handler.open_entry(root, index), Err(VfsError::StaleNode)));
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"not a zip at all").unwrap();

        let handler = ZipArchiveHandler::new();
        let mut tree = NodeTree::new();
        let result = handler.map_archive("broken.zip", &path, None, &mut tree);

        assert!(matches!(result, Err(VfsError::InvalidArchive { .. })));
        assert!(tree.is_empty());
    }
}
