//! # VFS Benchmark
//!
//! Lookup and enumeration over a mounted tree of a few thousand nodes.
//!
//! Run with: `cargo bench --package kiln_vfs`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kiln_vfs::{filter, NodeId, Vfs};
use std::fs;

const FOLDERS: usize = 32;
const FILES_PER_FOLDER: usize = 128;

fn mounted() -> (tempfile::TempDir, Vfs) {
    let dir = tempfile::tempdir().unwrap();
    for folder in 0..FOLDERS {
        let path = dir.path().join(format!("folder_{folder:02}"));
        fs::create_dir(&path).unwrap();
        for file in 0..FILES_PER_FOLDER {
            let ext = if file % 2 == 0 { "png" } else { "json" };
            fs::write(path.join(format!("asset_{file:03}.{ext}")), b"x").unwrap();
        }
    }
    let mut vfs = Vfs::with_default_handlers();
    vfs.mount(dir.path()).unwrap();
    (dir, vfs)
}

/// Benchmark: resolve a logical path.
fn bench_get_node(c: &mut Criterion) {
    let (_dir, vfs) = mounted();
    c.bench_function("vfs_get_node", |b| {
        b.iter(|| black_box(vfs.get_node(black_box("folder_17/asset_099.json"))));
    });
}

/// Benchmark: filtered two-call enumeration.
fn bench_copy_children(c: &mut Criterion) {
    let (_dir, vfs) = mounted();
    let folder = vfs.get_node("folder_03").unwrap();
    let pngs = filter::extension_include("png");
    let mut buffer = vec![NodeId::default(); FILES_PER_FOLDER];

    c.bench_function("vfs_copy_children_filtered", |b| {
        b.iter(|| black_box(vfs.copy_children(folder, Some(&pngs), &mut buffer).unwrap()));
    });
}

criterion_group!(benches, bench_get_node, bench_copy_children);
criterion_main!(benches);
