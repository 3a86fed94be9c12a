//! In-memory file content.
//!
//! A [`VirtualFile`] is one file's growable byte buffer behind its own
//! `RwLock`: readers of the same file run concurrently, writers (delete
//! included) exclude everyone, and files never block each other. The same
//! type with an empty buffer serves as a directory marker.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{FileStat, VfsError, VfsFile};

/// A single file's content and metadata.
///
/// Shared via `Arc` between the owning tree node and any handles returned
/// to callers, so a delete through one reference is observed by all.
pub(crate) struct VirtualFile {
    name: String,
    is_dir: bool,
    inner: RwLock<FileInner>,
}

struct FileInner {
    data: Vec<u8>,
    mod_time: SystemTime,
    deleted: bool,
}

impl VirtualFile {
    /// New empty regular file.
    pub(crate) fn file(name: &str) -> Arc<Self> {
        Self::with_kind(name, false)
    }

    /// New directory marker: metadata only, no byte buffer use.
    pub(crate) fn directory(name: &str) -> Arc<Self> {
        Self::with_kind(name, true)
    }

    fn with_kind(name: &str, is_dir: bool) -> Arc<Self> {
        Arc::new(VirtualFile {
            name: name.to_string(),
            is_dir,
            inner: RwLock::new(FileInner {
                data: Vec::new(),
                mod_time: SystemTime::now(),
                deleted: false,
            }),
        })
    }
}

#[async_trait]
impl VfsFile for VirtualFile {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, VfsError> {
        let inner = self.inner.read().await;
        if inner.deleted {
            return Err(VfsError::FileNotAccessible {
                operation: "read".to_string(),
            });
        }
        let n = buf.len().min(inner.data.len());
        buf[..n].copy_from_slice(&inner.data[..n]);
        Ok(n)
    }

    async fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError> {
        let inner = self.inner.read().await;
        if inner.deleted {
            return Err(VfsError::FileNotAccessible {
                operation: "read_at".to_string(),
            });
        }
        if offset >= inner.data.len() as u64 {
            return Err(VfsError::InvalidOffset {
                operation: "read_at".to_string(),
                offset,
            });
        }
        let offset = offset as usize;
        let n = buf.len().min(inner.data.len() - offset);
        buf[..n].copy_from_slice(&inner.data[offset..offset + n]);
        Ok(n)
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, VfsError> {
        let mut inner = self.inner.write().await;
        if inner.deleted {
            return Err(VfsError::FileNotAccessible {
                operation: "write".to_string(),
            });
        }
        // Shrink policy: the buffer always becomes an exact copy of `buf`,
        // so a shorter write leaves no stale tail behind.
        inner.data = buf.to_vec();
        inner.mod_time = SystemTime::now();
        Ok(buf.len())
    }

    async fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize, VfsError> {
        let mut inner = self.inner.write().await;
        if inner.deleted {
            return Err(VfsError::FileNotAccessible {
                operation: "write_at".to_string(),
            });
        }
        let offset = offset as usize;
        let end = offset + buf.len();
        if end > inner.data.len() {
            // Grow to end + 1; the gap between the old size and `offset`
            // stays zero-valued.
            inner.data.resize(end + 1, 0);
        }
        inner.data[offset..end].copy_from_slice(buf);
        inner.mod_time = SystemTime::now();
        Ok(buf.len())
    }

    async fn stat(&self) -> FileStat {
        let inner = self.inner.read().await;
        FileStat {
            name: self.name.clone(),
            size: inner.data.len() as u64,
            mod_time: inner.mod_time,
            is_dir: self.is_dir,
        }
    }

    async fn delete(&self) {
        let mut inner = self.inner.write().await;
        inner.data = Vec::new();
        inner.mod_time = SystemTime::now();
        inner.deleted = true;
    }
}

// ============================================================================
// Tests
// ============================================================================
