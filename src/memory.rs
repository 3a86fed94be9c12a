//! In-memory storage engine.
//!
//! [`MemFileSystem`] owns the root of the node tree, the delimiter, and the
//! session table. Structural mutation (create, mkdir, remove) serializes on
//! the tree-wide lock; byte-level I/O goes through each file's own lock and
//! never touches the tree.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;

use crate::file::VirtualFile;
use crate::mount::MountRegistry;
use crate::node::FileNode;
use crate::path::{Path, DEFAULT_PATH_DELIMITER};
use crate::types::{
    Context, ExistingHandle, FileHandle, FileStat, VfsError, VfsFile, VirtualFileSystem,
};

/// In-memory virtual filesystem, one instance per mounted path.
pub struct MemFileSystem {
    mount: Path,
    delimiter: String,
    root: RwLock<FileNode>,
    sessions: RwLock<SessionTable>,
}

impl fmt::Debug for MemFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemFileSystem")
            .field("delimiter", &self.delimiter)
            .finish_non_exhaustive()
    }
}

impl MemFileSystem {
    /// Mount a new in-memory filesystem at `mount_path` with the default
    /// delimiter and register it in `registry`.
    pub async fn mount(
        registry: &MountRegistry,
        mount_path: &str,
    ) -> Result<Arc<Self>, VfsError> {
        Self::mount_with_delimiter(registry, mount_path, DEFAULT_PATH_DELIMITER).await
    }

    /// Mount with a custom path delimiter.
    ///
    /// `mount_path` must start with the delimiter; a single trailing
    /// delimiter is stripped before registration.
    pub async fn mount_with_delimiter(
        registry: &MountRegistry,
        mount_path: &str,
        delimiter: &str,
    ) -> Result<Arc<Self>, VfsError> {
        if delimiter.is_empty() || !mount_path.starts_with(delimiter) {
            return Err(VfsError::InvalidMountPath {
                path: mount_path.to_string(),
            });
        }
        let canonical = mount_path.strip_suffix(delimiter).unwrap_or(mount_path);

        let fs = Arc::new(MemFileSystem {
            mount: Path::with_delimiter(canonical, delimiter),
            delimiter: delimiter.to_string(),
            root: RwLock::new(FileNode::root(delimiter)),
            sessions: RwLock::new(SessionTable::default()),
        });
        registry
            .register(canonical, delimiter, Arc::clone(&fs) as Arc<dyn VirtualFileSystem>)
            .await?;
        debug!("mounted in-memory filesystem at '{}'", canonical);
        Ok(fs)
    }

    /// The canonical path this filesystem is mounted on.
    pub fn mount_path(&self) -> &Path {
        &self.mount
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// The session's current working directory as a rooted path.
    pub async fn present_working_directory(&self, context: Context) -> Result<Path, VfsError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(context)
            .cloned()
            .ok_or_else(|| VfsError::InvalidContext {
                path: String::new(),
                operation: "present_working_directory".to_string(),
            })
    }

    /// Resolve `pathname` to a rooted path: absolute paths stand alone,
    /// relative ones are joined onto the session's working directory.
    async fn resolve(
        &self,
        context: Context,
        pathname: &str,
        operation: &str,
    ) -> Result<Path, VfsError> {
        let target = Path::with_delimiter(pathname, &self.delimiter);
        let sessions = self.sessions.read().await;
        let cwd = sessions.get(context).ok_or_else(|| VfsError::InvalidContext {
            path: pathname.to_string(),
            operation: operation.to_string(),
        })?;
        if target.is_root() {
            Ok(target)
        } else {
            Ok(cwd.concat(&target))
        }
    }
}

#[async_trait]
impl VirtualFileSystem for MemFileSystem {
    async fn context(&self) -> Context {
        let cwd = Path::with_delimiter(&self.delimiter, &self.delimiter);
        self.sessions.write().await.allocate(cwd)
    }

    async fn release_context(&self, context: Context) -> Result<(), VfsError> {
        if self.sessions.write().await.release(context) {
            Ok(())
        } else {
            Err(VfsError::InvalidContext {
                path: String::new(),
                operation: "release_context".to_string(),
            })
        }
    }

    async fn new_file(&self, context: Context, pathname: &str) -> Result<FileHandle, VfsError> {
        let target = Path::with_delimiter(pathname, &self.delimiter);
        if target.file_name().is_empty() {
            return Err(VfsError::IllegalFileName {
                path: pathname.to_string(),
                operation: "new_file".to_string(),
            });
        }
        let full = self.resolve(context, pathname, "new_file").await?;

        let mut root = self.root.write().await;
        if let Some(existing) = root.get_file(&full, 0) {
            return Err(VfsError::FileExists {
                path: pathname.to_string(),
                operation: "new_file".to_string(),
                existing: Some(ExistingHandle(existing)),
            });
        }
        let file = VirtualFile::file(full.file_name());
        root.add_file(&full, Arc::clone(&file), 0);
        Ok(file)
    }

    async fn open_file(&self, context: Context, pathname: &str) -> Result<FileHandle, VfsError> {
        let full = self.resolve(context, pathname, "open_file").await?;
        let root = self.root.read().await;
        match root.get_file(&full, 0) {
            Some(file) => Ok(file),
            None => Err(VfsError::NoSuchFileOrDirectory {
                path: pathname.to_string(),
                operation: "open_file".to_string(),
            }),
        }
    }

    async fn remove(&self, context: Context, pathname: &str) -> Result<(), VfsError> {
        let full = self.resolve(context, pathname, "remove").await?;
        if full.is_empty() {
            return Err(VfsError::IllegalFileName {
                path: pathname.to_string(),
                operation: "remove".to_string(),
            });
        }

        let detached = self.root.write().await.remove(&full, 0);
        let Some(subtree) = detached else {
            return Err(VfsError::NoSuchFileOrDirectory {
                path: pathname.to_string(),
                operation: "remove".to_string(),
            });
        };

        // Tombstone outside the tree lock; per-file locks suffice here.
        let mut files = Vec::new();
        subtree.collect_files(&mut files);
        for file in &files {
            file.delete().await;
        }
        debug!("removed '{}' ({} nodes)", full, files.len());
        Ok(())
    }

    async fn mkdir(&self, context: Context, pathname: &str) -> Result<(), VfsError> {
        let full = self.resolve(context, pathname, "mkdir").await?;
        let mut root = self.root.write().await;

        // A file anywhere along the path blocks the directory.
        {
            let mut node: &FileNode = &root;
            for i in 0..full.len() {
                match node.child(full.segment(i)) {
                    Some(child) => {
                        if child.is_file() {
                            return Err(VfsError::FileExists {
                                path: pathname.to_string(),
                                operation: "mkdir".to_string(),
                                existing: None,
                            });
                        }
                        node = child;
                    }
                    None => break,
                }
            }
        }

        root.add_directory(&full, 0);
        Ok(())
    }

    async fn change_directory(&self, context: Context, pathname: &str) -> Result<(), VfsError> {
        let full = self.resolve(context, pathname, "change_directory").await?;
        {
            let root = self.root.read().await;
            if root.get_node(&full, 0).is_none() {
                return Err(VfsError::NoSuchFileOrDirectory {
                    path: pathname.to_string(),
                    operation: "change_directory".to_string(),
                });
            }
        }
        // Replace the cursor with the resolved location wholesale.
        if self.sessions.write().await.set(context, full) {
            Ok(())
        } else {
            Err(VfsError::InvalidContext {
                path: pathname.to_string(),
                operation: "change_directory".to_string(),
            })
        }
    }

    async fn file_existed(&self, context: Context, pathname: &str) -> bool {
        let Ok(full) = self.resolve(context, pathname, "file_existed").await else {
            return false;
        };
        self.root.read().await.get_node(&full, 0).is_some()
    }

    async fn list_segments(
        &self,
        context: Context,
        pathname: &str,
    ) -> Result<Vec<FileStat>, VfsError> {
        let full = self.resolve(context, pathname, "list_segments").await?;
        let root = self.root.read().await;
        let node = root
            .get_node(&full, 0)
            .ok_or_else(|| VfsError::NoSuchFileOrDirectory {
                path: pathname.to_string(),
                operation: "list_segments".to_string(),
            })?;

        let mut stats = Vec::new();
        if let Some(children) = node.children() {
            for child in children.values() {
                stats.push(child.content().stat().await);
            }
        }
        Ok(stats)
    }
}

// ============================================================================
// Session table
// ============================================================================

/// Arena of session slots. A released slot bumps its generation before
/// going back on the free list, so stale handles cannot alias a new
/// session.
#[derive(Default)]
struct SessionTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

struct Slot {
    generation: u32,
    /// `None` marks a free slot.
    cwd: Option<Path>,
}

impl SessionTable {
    fn allocate(&mut self, cwd: Path) -> Context {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize].cwd = Some(cwd);
            return Context {
                slot,
                generation: self.slots[slot as usize].generation,
            };
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            cwd: Some(cwd),
        });
        Context { slot, generation: 0 }
    }

    fn get(&self, context: Context) -> Option<&Path> {
        let slot = self.slots.get(context.slot as usize)?;
        if slot.generation != context.generation {
            return None;
        }
        slot.cwd.as_ref()
    }

    fn set(&mut self, context: Context, cwd: Path) -> bool {
        match self.slots.get_mut(context.slot as usize) {
            Some(slot) if slot.generation == context.generation && slot.cwd.is_some() => {
                slot.cwd = Some(cwd);
                true
            }
            _ => false,
        }
    }

    fn release(&mut self, context: Context) -> bool {
        match self.slots.get_mut(context.slot as usize) {
            Some(slot) if slot.generation == context.generation && slot.cwd.is_some() => {
                slot.cwd = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(context.slot);
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn mounted(path: &str) -> Arc<MemFileSystem> {
        let registry = MountRegistry::new();
        MemFileSystem::mount(&registry, path).await.unwrap()
    }

    #[tokio::test]
    async fn test_mount_requires_leading_delimiter() {
        let registry = MountRegistry::new();
        let err = MemFileSystem::mount(&registry, "mount").await.unwrap_err();
        assert!(matches!(err, VfsError::InvalidMountPath { .. }));
    }

    #[tokio::test]
    async fn test_mount_strips_trailing_delimiter() {
        let registry = MountRegistry::new();
        let fs = MemFileSystem::mount(&registry, "/mnt/data/").await.unwrap();
        assert_eq!(fs.mount_path().to_string(), "/mnt/data");
        assert_eq!(registry.mounted_paths().await, vec!["/mnt/data"]);
    }

    #[tokio::test]
    async fn test_new_file_then_open_file() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;

        let f = fs.new_file(ctx, "/test/path/newfile").await.unwrap();
        f.write(b"hello").await.unwrap();

        // Relative resolution from the root working directory.
        let opened = fs.open_file(ctx, "test/path/newfile").await.unwrap();
        let mut buf = [0u8; 5];
        opened.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_new_file_rejects_directory_pathnames() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;

        for pathname in ["", "/", "test/path/"] {
            let err = fs.new_file(ctx, pathname).await.unwrap_err();
            assert!(matches!(err, VfsError::IllegalFileName { .. }));
        }
    }

    #[tokio::test]
    async fn test_new_file_on_existing_path_returns_handle_with_error() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;

        let first = fs.new_file(ctx, "/a/f").await.unwrap();
        first.write(b"kept").await.unwrap();

        let err = fs.new_file(ctx, "/a/f").await.unwrap_err();
        let VfsError::FileExists {
            existing: Some(handle),
            ..
        } = err
        else {
            panic!("expected FileExists carrying the live handle");
        };
        let mut buf = [0u8; 4];
        handle.0.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"kept");
    }

    #[tokio::test]
    async fn test_open_file_missing() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;
        let err = fs.open_file(ctx, "/nope").await.unwrap_err();
        assert!(matches!(err, VfsError::NoSuchFileOrDirectory { .. }));
    }

    #[tokio::test]
    async fn test_remove_tombstones_the_subtree() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;

        let f1 = fs.new_file(ctx, "/test/path/f1").await.unwrap();
        fs.new_file(ctx, "/test/path/f2").await.unwrap();

        fs.remove(ctx, "/test/path").await.unwrap();

        assert!(!fs.file_existed(ctx, "/test/path/f1").await);
        assert!(!fs.file_existed(ctx, "/test/path/f2").await);
        assert!(!fs.file_existed(ctx, "/test/path").await);
        assert!(fs.file_existed(ctx, "/test/").await);

        // Handles obtained before the removal are dead.
        let mut buf = [0u8; 1];
        assert!(matches!(
            f1.read(&mut buf).await.unwrap_err(),
            VfsError::FileNotAccessible { .. }
        ));
        assert!(matches!(
            f1.write(b"x").await.unwrap_err(),
            VfsError::FileNotAccessible { .. }
        ));
    }

    #[tokio::test]
    async fn test_remove_sequences() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;
        fs.new_file(ctx, "test/path/file").await.unwrap();

        fs.remove(ctx, "test/path/file").await.unwrap();
        assert!(fs.remove(ctx, "test/path/file").await.is_err());
        assert!(fs.remove(ctx, "test/path/file22").await.is_err());

        fs.remove(ctx, "test").await.unwrap();
        assert!(fs.remove(ctx, "test/path/file").await.is_err());
        assert!(fs.remove(ctx, "test/path").await.is_err());
    }

    #[tokio::test]
    async fn test_mkdir_and_list_segments() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;

        fs.mkdir(ctx, "test2").await.unwrap();
        fs.mkdir(ctx, "test").await.unwrap();
        fs.mkdir(ctx, "test1").await.unwrap();

        let mut names: Vec<String> = fs
            .list_segments(ctx, "/")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["test", "test1", "test2"]);

        for stat in fs.list_segments(ctx, "/").await.unwrap() {
            assert!(stat.is_dir);
        }
    }

    #[tokio::test]
    async fn test_list_segments_snapshots_are_detached() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;
        let f = fs.new_file(ctx, "/d/file").await.unwrap();
        f.write(b"1234").await.unwrap();

        let stats = fs.list_segments(ctx, "/d").await.unwrap();
        assert_eq!(stats[0].size, 4);

        f.write(b"123456").await.unwrap();
        // The earlier snapshot is unaffected.
        assert_eq!(stats[0].size, 4);
    }

    #[tokio::test]
    async fn test_mkdir_over_file_is_file_exists() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;
        fs.new_file(ctx, "/f").await.unwrap();

        let err = fs.mkdir(ctx, "/f").await.unwrap_err();
        assert!(matches!(err, VfsError::FileExists { .. }));

        // A file in the middle of the path blocks too.
        let err = fs.mkdir(ctx, "/f/sub").await.unwrap_err();
        assert!(matches!(err, VfsError::FileExists { .. }));

        // Existing directory is fine.
        fs.mkdir(ctx, "/d").await.unwrap();
        fs.mkdir(ctx, "/d").await.unwrap();
    }

    #[tokio::test]
    async fn test_mkdir_with_trailing_delimiter() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;
        fs.mkdir(ctx, "test/path/").await.unwrap();
        assert!(fs.file_existed(ctx, "test/path").await);
    }

    #[tokio::test]
    async fn test_change_directory() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;
        fs.new_file(ctx, "test/path/file").await.unwrap();

        assert_eq!(fs.present_working_directory(ctx).await.unwrap().to_string(), "/");

        fs.change_directory(ctx, "test").await.unwrap();
        assert_eq!(
            fs.present_working_directory(ctx).await.unwrap().to_string(),
            "/test"
        );

        fs.change_directory(ctx, "path").await.unwrap();
        assert_eq!(
            fs.present_working_directory(ctx).await.unwrap().to_string(),
            "/test/path"
        );

        fs.change_directory(ctx, "/").await.unwrap();
        assert_eq!(fs.present_working_directory(ctx).await.unwrap().to_string(), "/");
    }

    #[tokio::test]
    async fn test_change_directory_failure_leaves_cwd_alone() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;
        fs.mkdir(ctx, "/test").await.unwrap();
        fs.change_directory(ctx, "/test").await.unwrap();

        let err = fs.change_directory(ctx, "nonexistent").await.unwrap_err();
        assert!(matches!(err, VfsError::NoSuchFileOrDirectory { .. }));
        assert_eq!(
            fs.present_working_directory(ctx).await.unwrap().to_string(),
            "/test"
        );
    }

    #[tokio::test]
    async fn test_relative_operations_follow_cwd() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;
        fs.mkdir(ctx, "/test").await.unwrap();

        fs.change_directory(ctx, "/test").await.unwrap();
        fs.new_file(ctx, "path/file2").await.unwrap();
        assert!(fs.file_existed(ctx, "/test/path/file2").await);

        // Empty pathname lists the working directory itself.
        fs.change_directory(ctx, "path").await.unwrap();
        let stats = fs.list_segments(ctx, "").await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, "file2");
    }

    #[tokio::test]
    async fn test_contexts_are_independent() {
        let fs = mounted("/mnt").await;
        let a = fs.context().await;
        let b = fs.context().await;
        fs.mkdir(a, "/dir").await.unwrap();

        fs.change_directory(a, "/dir").await.unwrap();
        assert_eq!(fs.present_working_directory(a).await.unwrap().to_string(), "/dir");
        assert_eq!(fs.present_working_directory(b).await.unwrap().to_string(), "/");
    }

    #[tokio::test]
    async fn test_released_context_is_invalid() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;
        fs.release_context(ctx).await.unwrap();

        assert!(matches!(
            fs.change_directory(ctx, "/").await.unwrap_err(),
            VfsError::InvalidContext { .. }
        ));
        assert!(matches!(
            fs.release_context(ctx).await.unwrap_err(),
            VfsError::InvalidContext { .. }
        ));
        assert!(!fs.file_existed(ctx, "/").await);
    }

    #[tokio::test]
    async fn test_stale_context_does_not_alias_reused_slot() {
        let fs = mounted("/mnt").await;
        let stale = fs.context().await;
        fs.release_context(stale).await.unwrap();

        // The slot is reused, but the stale token stays dead.
        let fresh = fs.context().await;
        assert_eq!(stale.slot, fresh.slot);
        assert!(fs.open_file(stale, "/x").await.is_err());
        assert!(matches!(
            fs.new_file(stale, "/x").await.unwrap_err(),
            VfsError::InvalidContext { .. }
        ));
        fs.new_file(fresh, "/x").await.unwrap();
    }

    #[tokio::test]
    async fn test_custom_delimiter_filesystem() {
        let registry = MountRegistry::new();
        let fs = MemFileSystem::mount_with_delimiter(&registry, ":mount", ":")
            .await
            .unwrap();
        let ctx = fs.context().await;

        fs.new_file(ctx, ":a:b:f").await.unwrap();
        assert!(fs.file_existed(ctx, "a:b:f").await);
        fs.change_directory(ctx, "a").await.unwrap();
        fs.open_file(ctx, "b:f").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_is_an_alias_for_new_file() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;
        fs.create(ctx, "/made").await.unwrap();
        assert!(fs.file_existed(ctx, "/made").await);
        assert!(fs.create(ctx, "/made").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_readers_and_writers() {
        let fs = mounted("/mnt").await;
        let ctx = fs.context().await;
        let file = fs.new_file(ctx, "/shared").await.unwrap();
        file.write(b"seed").await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let handle = Arc::clone(&file);
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    let mut buf = [0u8; 4];
                    handle.read(&mut buf).await.unwrap();
                } else {
                    handle.write(b"seed").await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"seed");
    }
}
