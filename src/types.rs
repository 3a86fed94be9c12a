//! Core types and traits for the virtual filesystem.
//!
//! The [`VirtualFileSystem`] and [`VfsFile`] traits are the contract every
//! storage engine implements; the in-memory engine in [`crate::memory`] is
//! one implementation, an OS-backed pass-through would be another.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// Virtual filesystem errors.
///
/// Every expected failure is returned as a value; each variant carries the
/// failing operation and, where one exists, the offending path.
#[derive(Error, Debug, Clone)]
pub enum VfsError {
    #[error("no such file or directory, {operation} '{path}'")]
    NoSuchFileOrDirectory { path: String, operation: String },

    #[error("file exists, {operation} '{path}'")]
    FileExists {
        path: String,
        operation: String,
        /// The live handle already at this path, when the operation could
        /// have produced one. Lets a caller that lost a creation race use
        /// the file that is there instead of re-opening it.
        existing: Option<ExistingHandle>,
    },

    #[error("illegal file name, {operation} '{path}'")]
    IllegalFileName { path: String, operation: String },

    #[error("invalid context, {operation} '{path}'")]
    InvalidContext { path: String, operation: String },

    #[error("invalid mount path, mount '{path}'")]
    InvalidMountPath { path: String },

    #[error("nested mount, mount '{path}' overlaps '{conflict}'")]
    NestedMount { path: String, conflict: String },

    #[error("invalid offset {offset}, {operation}")]
    InvalidOffset { operation: String, offset: u64 },

    #[error("file not accessible, {operation}")]
    FileNotAccessible { operation: String },
}

/// A [`FileHandle`] carried inside [`VfsError::FileExists`].
///
/// Wrapped so the error enum can still derive `Debug`; the handle itself has
/// nothing useful to print.
#[derive(Clone)]
pub struct ExistingHandle(pub FileHandle);

impl fmt::Debug for ExistingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExistingHandle(..)")
    }
}

/// Detached stat snapshot for a file or directory.
///
/// Snapshots are plain values: once returned they never change, no matter
/// what happens to the live file afterwards.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub name: String,
    pub size: u64,
    pub mod_time: SystemTime,
    pub is_dir: bool,
}

/// Session handle: one caller's independent working-directory cursor into a
/// mounted filesystem.
///
/// Contexts are slot/generation pairs into the filesystem's session arena.
/// Releasing a context bumps the slot's generation, so a stale copy of a
/// released handle fails with [`VfsError::InvalidContext`] instead of
/// silently aliasing whichever session reused the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Context {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

/// Shared handle to an open file.
pub type FileHandle = Arc<dyn VfsFile>;

impl fmt::Debug for dyn VfsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VfsFile(..)")
    }
}

/// Byte-level operations on a single open file.
///
/// Handles are shared: several callers may hold handles to the same file,
/// and a `delete` through any of them (or through the owning filesystem's
/// `remove`) makes every handle fail with [`VfsError::FileNotAccessible`].
#[async_trait]
pub trait VfsFile: Send + Sync {
    /// Copy up to `buf.len()` bytes from the start of the file into `buf`.
    ///
    /// There is no read cursor; every call re-reads from offset zero.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, VfsError>;

    /// Copy up to `buf.len()` bytes starting at `offset`.
    ///
    /// Fails with [`VfsError::InvalidOffset`] when `offset` is at or past
    /// the end of the file.
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError>;

    /// Replace the file's content with `buf`, resizing to exactly
    /// `buf.len()` bytes.
    async fn write(&self, buf: &[u8]) -> Result<usize, VfsError>;

    /// Write `buf` starting at `offset`, growing the file if needed.
    ///
    /// Bytes between the old end of file and `offset` read back as zero.
    async fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize, VfsError>;

    /// Stat snapshot of this file.
    async fn stat(&self) -> FileStat;

    /// Release the file's content and mark it inaccessible for every
    /// outstanding handle.
    async fn delete(&self);
}

/// The public contract shared by all storage engines.
#[async_trait]
pub trait VirtualFileSystem: Send + Sync {
    /// Open a new session with its working directory at the mount root.
    async fn context(&self) -> Context;

    /// Release a session so its slot can be reused.
    async fn release_context(&self, context: Context) -> Result<(), VfsError>;

    /// Create an empty file at `pathname`, creating intermediate
    /// directories as needed.
    ///
    /// If something already lives at that path the error carries its
    /// handle and nothing is modified.
    async fn new_file(&self, context: Context, pathname: &str) -> Result<FileHandle, VfsError>;

    /// Alias of [`new_file`](Self::new_file).
    async fn create(&self, context: Context, pathname: &str) -> Result<FileHandle, VfsError> {
        self.new_file(context, pathname).await
    }

    /// Open the existing file at `pathname`. No truncation, no reset.
    async fn open_file(&self, context: Context, pathname: &str) -> Result<FileHandle, VfsError>;

    /// Remove the file or directory at `pathname` and everything beneath
    /// it. Every file in the subtree becomes inaccessible through any
    /// outstanding handle.
    async fn remove(&self, context: Context, pathname: &str) -> Result<(), VfsError>;

    /// Create a directory at `pathname`, creating intermediate directories
    /// as needed. Idempotent when a directory is already there.
    async fn mkdir(&self, context: Context, pathname: &str) -> Result<(), VfsError>;

    /// Re-point the session's working directory at `pathname`.
    async fn change_directory(&self, context: Context, pathname: &str) -> Result<(), VfsError>;

    /// True iff `pathname` resolves to an existing file or directory.
    async fn file_existed(&self, context: Context, pathname: &str) -> bool;

    /// Stat snapshots for the direct children of the directory at
    /// `pathname`. One level, no recursion, no defined order.
    async fn list_segments(&self, context: Context, pathname: &str)
        -> Result<Vec<FileStat>, VfsError>;
}
