//! Mount registry.
//!
//! One registry per process (or per test), constructed by the caller and
//! handed to every mount operation. Mount paths must not overlap: a
//! duplicate is rejected with `FileExists`, an ancestor or descendant of an
//! existing mount with `NestedMount`.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::RwLock;

use crate::types::{VfsError, VirtualFileSystem};

struct MountEntry {
    delimiter: String,
    fs: Arc<dyn VirtualFileSystem>,
}

/// Table of mounted filesystems keyed by canonical mount path.
#[derive(Default)]
pub struct MountRegistry {
    mounts: RwLock<BTreeMap<String, MountEntry>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `fs` at the canonical mount path `path`.
    ///
    /// `path` must already be canonical: no trailing delimiter. Fails with
    /// `FileExists` when exactly this path is registered, and with
    /// `NestedMount` when `path` is a delimiter-bounded prefix of an
    /// existing mount or vice versa.
    pub async fn register(
        &self,
        path: &str,
        delimiter: &str,
        fs: Arc<dyn VirtualFileSystem>,
    ) -> Result<(), VfsError> {
        let mut mounts = self.mounts.write().await;
        for (existing, entry) in mounts.iter() {
            if existing == path {
                return Err(VfsError::FileExists {
                    path: path.to_string(),
                    operation: "mount".to_string(),
                    existing: None,
                });
            }
            let under_existing = path.starts_with(&format!("{}{}", existing, entry.delimiter));
            let over_existing = existing.starts_with(&format!("{}{}", path, delimiter));
            if under_existing || over_existing {
                return Err(VfsError::NestedMount {
                    path: path.to_string(),
                    conflict: existing.clone(),
                });
            }
        }
        mounts.insert(
            path.to_string(),
            MountEntry {
                delimiter: delimiter.to_string(),
                fs,
            },
        );
        debug!("registered mount '{}'", path);
        Ok(())
    }

    /// Drop the mount at `path`. Returns `false` when nothing was mounted
    /// there. Outstanding references to the filesystem stay usable; the
    /// path just becomes available again.
    pub async fn unregister(&self, path: &str) -> bool {
        let removed = self.mounts.write().await.remove(path).is_some();
        if removed {
            debug!("unregistered mount '{}'", path);
        }
        removed
    }

    /// The filesystem registered at exactly `path`.
    pub async fn lookup(&self, path: &str) -> Option<Arc<dyn VirtualFileSystem>> {
        self.mounts.read().await.get(path).map(|e| Arc::clone(&e.fs))
    }

    /// All registered mount paths, in lexical order.
    pub async fn mounted_paths(&self) -> Vec<String> {
        self.mounts.read().await.keys().cloned().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemFileSystem;

    #[tokio::test]
    async fn test_duplicate_mount_is_file_exists() {
        let registry = MountRegistry::new();
        MemFileSystem::mount(&registry, "/root/mount").await.unwrap();

        let err = MemFileSystem::mount(&registry, "/root/mount")
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::FileExists { .. }));
    }

    #[tokio::test]
    async fn test_nested_mounts_are_rejected_both_ways() {
        let registry = MountRegistry::new();
        MemFileSystem::mount(&registry, "/root/mount").await.unwrap();

        let err = MemFileSystem::mount(&registry, "/root/mount/sub")
            .await
            .unwrap_err();
        assert!(
            matches!(err, VfsError::NestedMount { ref conflict, .. } if conflict == "/root/mount")
        );

        let err = MemFileSystem::mount(&registry, "/root").await.unwrap_err();
        assert!(
            matches!(err, VfsError::NestedMount { ref conflict, .. } if conflict == "/root/mount")
        );
    }

    #[tokio::test]
    async fn test_sibling_mounts_coexist() {
        let registry = MountRegistry::new();
        MemFileSystem::mount(&registry, "/root/a").await.unwrap();
        MemFileSystem::mount(&registry, "/root/ab").await.unwrap();
        MemFileSystem::mount(&registry, "/other").await.unwrap();

        assert_eq!(
            registry.mounted_paths().await,
            vec!["/other", "/root/a", "/root/ab"]
        );
    }

    #[tokio::test]
    async fn test_unregister_frees_the_path() {
        let registry = MountRegistry::new();
        MemFileSystem::mount(&registry, "/mnt").await.unwrap();

        assert!(registry.unregister("/mnt").await);
        assert!(!registry.unregister("/mnt").await);

        MemFileSystem::mount(&registry, "/mnt").await.unwrap();
    }

    #[tokio::test]
    async fn test_lookup() {
        let registry = MountRegistry::new();
        let fs = MemFileSystem::mount(&registry, "/mnt").await.unwrap();

        let found = registry.lookup("/mnt").await.unwrap();
        let ctx = found.context().await;
        found.new_file(ctx, "/probe").await.unwrap();

        let ctx = fs.context().await;
        assert!(fs.file_existed(ctx, "/probe").await);

        assert!(registry.lookup("/elsewhere").await.is_none());
    }

    #[tokio::test]
    async fn test_registries_are_isolated() {
        let a = MountRegistry::new();
        let b = MountRegistry::new();
        MemFileSystem::mount(&a, "/mnt").await.unwrap();
        MemFileSystem::mount(&b, "/mnt").await.unwrap();
    }
}
