//! Integration test for mounting directories and zip archives.

use kiln_vfs::filter::{self, FilterExt};
use kiln_vfs::{FileFilter, NodeId, NodeKind, Vfs, VfsError};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
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

/// Six top-level entries, mirroring a small game content folder.
const ARCHIVE_ENTRIES: &[(&str, &str)] = &[
    ("content/", ""),
    ("content/game.cfg", "fullscreen=1"),
    ("content/levels/e1m1.lvl", "level one"),
    ("boot/", ""),
    ("boot/gamestate.lua", "return {}"),
    ("console.json", "{}"),
    ("preferences.json", "{}"),
    ("test.lua", "print(1)"),
    ("readme.txt", "hello"),
];

fn names(vfs: &Vfs, nodes: &[NodeId]) -> BTreeSet<String> {
    nodes
        .iter()
        .map(|id| vfs.node(*id).unwrap().name().to_owned())
        .collect()
}

#[test]
fn test_root_child_count_matches_disk() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("maps")).unwrap();
    fs::create_dir(dir.path().join("sounds")).unwrap();
    fs::write(dir.path().join("boot.cfg"), "x").unwrap();
    fs::write(dir.path().join("credits.txt"), "x").unwrap();
    write_zip(&dir.path().join("pack.zip"), ARCHIVE_ENTRIES);

    let mut vfs = Vfs::with_default_handlers();
    let root = vfs.mount(dir.path()).unwrap();

    let on_disk = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(vfs.child_count(root), on_disk);

    let pack = vfs.get_child(root, "pack.zip").unwrap();
    assert_eq!(vfs.node(pack).unwrap().kind(), NodeKind::ArchiveRoot);
    assert!(vfs.node(pack).unwrap().is_folder());
}

#[test]
fn test_archive_mirrors_zip_structure() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("test.zip");
    write_zip(&zip_path, ARCHIVE_ENTRIES);

    let mut vfs = Vfs::with_default_handlers();
    let root = vfs.mount(&zip_path).unwrap();

    assert_eq!(vfs.node(root).unwrap().name(), "test.zip");
    assert_eq!(vfs.child_count(root), 6);

    let level = vfs.get_node("content/levels/e1m1.lvl").unwrap();
    assert_eq!(vfs.node(level).unwrap().size(), 9);
    assert_eq!(vfs.logical_path(level), Some("content/levels/e1m1.lvl"));

    let levels = vfs.get_node("content/levels").unwrap();
    assert!(vfs.node(levels).unwrap().is_folder());
    assert_eq!(vfs.child_count(levels), 1);

    let mut text = String::new();
    vfs.open(level).unwrap().read_to_string(&mut text).unwrap();
    assert_eq!(text, "level one");
}

#[test]
fn test_filtered_enumeration_matches_predicate() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("test.zip");
    write_zip(&zip_path, ARCHIVE_ENTRIES);

    let mut vfs = Vfs::with_default_handlers();
    let root = vfs.mount(&zip_path).unwrap();
    let all = vfs.children(root, None);

    let filters: Vec<Box<dyn FileFilter>> = vec![
        Box::new(filter::extension_include("json")),
        Box::new(filter::extension_exclude("json")),
        Box::new(filter::name_include("e").unwrap()),
        Box::new(filter::name_exclude("^con").unwrap()),
        Box::new(filter::extension_include("lua").or(filter::extension_include("txt"))),
        Box::new(filter::extension_exclude("lua").and(filter::name_include("o").unwrap())),
    ];

    for f in &filters {
        let expected: BTreeSet<String> = names(&vfs, &all)
            .into_iter()
            .filter(|name| f.accept(name))
            .collect();

        let mut probe: [NodeId; 0] = [];
        let required = match vfs.copy_children(root, Some(f.as_ref()), &mut probe) {
            Ok(0) => 0,
            Err(VfsError::BufferTooSmall { required }) => required,
            other => panic!("unexpected probe result {other:?}"),
        };
        assert_eq!(required, expected.len());

        if required > 0 {
            let mut short = vec![NodeId::default(); required - 1];
            assert!(vfs.copy_children(root, Some(f.as_ref()), &mut short).is_err());
            assert!(short.iter().all(|id| *id == NodeId::default()));
        }

        let mut buffer = vec![NodeId::default(); required];
        let written = vfs.copy_children(root, Some(f.as_ref()), &mut buffer).unwrap();
        assert_eq!(written, required);
        assert_eq!(names(&vfs, &buffer), expected);
    }
}

#[test]
fn test_lookup_ignores_filters_and_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("test.zip");
    write_zip(&zip_path, ARCHIVE_ENTRIES);

    let mut vfs = Vfs::with_default_handlers();
    let root = vfs.mount(&zip_path).unwrap();

    assert!(vfs.get_child(root, "test.lua").is_some());
    assert!(vfs.get_child(root, "test").is_none());
    assert!(vfs.get_child(root, "TEST.LUA").is_none());
    let file = vfs.get_child(root, "readme.txt").unwrap();
    assert!(vfs.get_child(file, "anything").is_none());
}

#[test]
fn test_dispose_archive_releases_nodes() {
    let dir = tempfile::tempdir().unwrap();
    write_zip(&dir.path().join("pack.zip"), ARCHIVE_ENTRIES);
    fs::write(dir.path().join("loose.txt"), "x").unwrap();

    let mut vfs = Vfs::with_default_handlers();
    let root = vfs.mount(dir.path()).unwrap();
    let before = vfs.tree().len();
    let pack = vfs.get_child(root, "pack.zip").unwrap();
    let inner = vfs.get_node("pack.zip/readme.txt").unwrap();

    assert!(vfs.dispose_archive(pack));
    assert!(!vfs.dispose_archive(pack));

    assert!(vfs.get_child(root, "pack.zip").is_none());
    assert!(vfs.node(inner).is_none());
    assert_eq!(vfs.tree().len(), 2);
    assert!(before > vfs.tree().len());
}

#[test]
fn test_corrupt_archive_mounts_as_plain_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.zip"), "not a zip").unwrap();
    fs::write(dir.path().join("boot.cfg"), "x").unwrap();

    let mut vfs = Vfs::with_default_handlers();
    let root = vfs.mount(dir.path()).unwrap();

    assert_eq!(vfs.child_count(root), 2);
    let broken = vfs.get_child(root, "broken.zip").unwrap();
    assert_eq!(vfs.node(broken).unwrap().kind(), NodeKind::PlainFile);

    let mut text = String::new();
    vfs.open(broken).unwrap().read_to_string(&mut text).unwrap();
    assert_eq!(text, "not a zip");
}

#[test]
fn test_failed_archive_mount_keeps_existing_node() {
    let content = tempfile::tempdir().unwrap();
    write_zip(&content.path().join("pack.zip"), ARCHIVE_ENTRIES);
    let patch = tempfile::tempdir().unwrap();
    let broken = patch.path().join("pack.zip");
    fs::write(&broken, "not a zip").unwrap();

    let mut vfs = Vfs::with_default_handlers();
    let root = vfs.mount(content.path()).unwrap();
    let before = vfs.tree().len();

    assert!(matches!(vfs.mount(&broken), Err(VfsError::InvalidArchive { .. })));

    let pack = vfs.get_child(root, "pack.zip").unwrap();
    assert_eq!(vfs.node(pack).unwrap().kind(), NodeKind::ArchiveRoot);
    assert!(vfs.get_node("pack.zip/readme.txt").is_some());
    assert_eq!(vfs.tree().len(), before);
}

#[cfg(unix)]
#[test]
fn test_link_back_to_enclosing_folder_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let maps = dir.path().join("maps");
    fs::create_dir(&maps).unwrap();
    fs::write(maps.join("e1m1.map"), "x").unwrap();
    std::os::unix::fs::symlink(dir.path(), maps.join("up")).unwrap();

    let mut vfs = Vfs::with_default_handlers();
    let root = vfs.mount(dir.path()).unwrap();

    let maps = vfs.get_child(root, "maps").unwrap();
    assert_eq!(vfs.child_count(maps), 1);
    assert!(vfs.get_node("maps/e1m1.map").is_some());
    assert!(vfs.get_node("maps/up").is_none());
}
