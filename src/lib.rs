//! memvfs - a mountable virtual filesystem
//!
//! A hierarchical namespace of files and directories addressed by
//! delimiter-separated paths, exposed through session-scoped working
//! directories and backed by pluggable storage engines behind one
//! contract. This crate ships the in-memory engine:
//!
//! - [`MemFileSystem`]: a trie of path segments holding growable
//!   byte-buffer files, mounted on a path registered in a [`MountRegistry`]
//! - per-session working directories via [`Context`] handles
//! - tree-wide locking for structural mutation, per-file locking for
//!   byte-level I/O
//!
//! ```no_run
//! use memvfs::{MemFileSystem, MountRegistry, VfsFile, VirtualFileSystem};
//!
//! # async fn demo() -> Result<(), memvfs::VfsError> {
//! let registry = MountRegistry::new();
//! let fs = MemFileSystem::mount(&registry, "/mnt/scratch").await?;
//!
//! let ctx = fs.context().await;
//! let file = fs.new_file(ctx, "/notes/todo.txt").await?;
//! file.write(b"ship it").await?;
//!
//! fs.change_directory(ctx, "/notes").await?;
//! let _same = fs.open_file(ctx, "todo.txt").await?;
//! # Ok(())
//! # }
//! ```

mod file;
pub mod memory;
pub mod mount;
mod node;
pub mod path;
pub mod types;

pub use memory::MemFileSystem;
pub use mount::MountRegistry;
pub use path::{Path, Segments, DEFAULT_PATH_DELIMITER};
pub use types::{
    Context, ExistingHandle, FileHandle, FileStat, VfsError, VfsFile, VirtualFileSystem,
};
