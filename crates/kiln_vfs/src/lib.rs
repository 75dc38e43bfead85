//! # KILN Virtual File System
//!
//! One hierarchical namespace over plain directories and archive contents.
//!
//! ```text
//!   mount("content/")                      Vfs tree
//!   ─────────────────                      ────────
//!   content/                               content            (PlainFolder)
//!   ├── boot.cfg                 ──>       ├── boot.cfg       (PlainFile)
//!   ├── maps/                              ├── maps           (PlainFolder)
//!   │   └── e1m1.map                       │   └── e1m1.map   (PlainFile)
//!   └── sounds.zip                         └── sounds.zip     (ArchiveRoot)
//!       [fx/boom.ogg]                          └── fx         (ArchiveEntry, folder)
//!                                                  └── boom.ogg (ArchiveEntry)
//! ```
//!
//! ## Architecture Rules
//!
//! 1. **Arena, not pointers** - nodes live in a [`NodeTree`] and are
//!    addressed by generation-checked [`NodeId`] handles
//! 2. **Built once** - mounting needs `&mut Vfs`; lookups and enumeration
//!    take `&Vfs`, so a shared tree is immutable by construction
//! 3. **Handlers own archives** - each [`ArchiveHandler`] owns the library
//!    handles for the archives it mapped and releases them on dispose
//!
//! ## Example
//!
//! ```rust,ignore
//! use kiln_vfs::{filter, Vfs};
//!
//! let mut vfs = Vfs::with_default_handlers();
//! let root = vfs.mount("content".as_ref())?;
//! let maps = vfs.get_node("maps").unwrap();
//! let only_maps = filter::extension_include("map");
//! for child in vfs.children(maps, Some(&only_maps)) {
//!     println!("{}", vfs.logical_path(child).unwrap());
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod archive;
pub mod error;
pub mod filter;
pub mod node;
pub mod reader;
pub mod vfs;

pub use archive::zip_archive::ZipArchiveHandler;
pub use archive::ArchiveHandler;
pub use error::{VfsError, VfsResult};
pub use filter::{FileFilter, FilterExt};
pub use node::{Node, NodeId, NodeKind, NodeTree};
pub use reader::{FileReader, MemoryFileReader, PlainFileReader};
pub use vfs::Vfs;
