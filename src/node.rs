//! Path-segment trie backing the in-memory engine.
//!
//! Each node is either a directory (marker plus children keyed by segment)
//! or a file leaf. Nodes are owned exclusively by their parent; structural
//! mutation happens under the filesystem-wide lock in [`crate::memory`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::file::VirtualFile;
use crate::path::Path;

/// One node of the tree. A node with both file content and children, or
/// with neither, is unrepresentable.
pub(crate) enum FileNode {
    Directory {
        marker: Arc<VirtualFile>,
        children: HashMap<String, FileNode>,
    },
    File(Arc<VirtualFile>),
}

impl FileNode {
    /// Root node of a mounted filesystem. Always a directory marker.
    pub(crate) fn root(name: &str) -> Self {
        Self::directory(name)
    }

    fn directory(name: &str) -> Self {
        FileNode::Directory {
            marker: VirtualFile::directory(name),
            children: HashMap::new(),
        }
    }

    /// The node's content object: its file, or its directory marker.
    pub(crate) fn content(&self) -> &Arc<VirtualFile> {
        match self {
            FileNode::Directory { marker, .. } => marker,
            FileNode::File(file) => file,
        }
    }

    pub(crate) fn is_file(&self) -> bool {
        matches!(self, FileNode::File(_))
    }

    /// Direct children, `None` for file leaves.
    pub(crate) fn children(&self) -> Option<&HashMap<String, FileNode>> {
        match self {
            FileNode::Directory { children, .. } => Some(children),
            FileNode::File(_) => None,
        }
    }

    pub(crate) fn child(&self, segment: &str) -> Option<&FileNode> {
        self.children().and_then(|c| c.get(segment))
    }

    /// Attach `file` at `path`, descending from segment `i` and creating
    /// directory markers for every unresolved segment on the way. The leaf
    /// is overwritten unconditionally; a file sitting in the middle of the
    /// path gives way to a directory.
    pub(crate) fn add_file(&mut self, path: &Path, file: Arc<VirtualFile>, i: usize) {
        if i >= path.len() {
            return;
        }
        let FileNode::Directory { children, .. } = self else {
            return;
        };
        let segment = path.segment(i);
        if i == path.len() - 1 {
            children.insert(segment.to_string(), FileNode::File(file));
            return;
        }
        let child = children
            .entry(segment.to_string())
            .or_insert_with(|| FileNode::directory(segment));
        if child.is_file() {
            *child = FileNode::directory(segment);
        }
        child.add_file(path, file, i + 1);
    }

    /// Create directory markers along `path` from segment `i`. Existing
    /// nodes are never overwritten, so the call is idempotent; a file on
    /// the way stops the descent.
    pub(crate) fn add_directory(&mut self, path: &Path, i: usize) {
        if i >= path.len() {
            return;
        }
        let FileNode::Directory { children, .. } = self else {
            return;
        };
        let segment = path.segment(i);
        let child = children
            .entry(segment.to_string())
            .or_insert_with(|| FileNode::directory(segment));
        child.add_directory(path, i + 1);
    }

    /// Resolve `path` from segment `i`. An exhausted path resolves to the
    /// node itself, which is how operations on the working directory with
    /// an empty pathname work.
    pub(crate) fn get_node(&self, path: &Path, i: usize) -> Option<&FileNode> {
        if i >= path.len() {
            return Some(self);
        }
        self.child(path.segment(i))?.get_node(path, i + 1)
    }

    /// Content of the node at `path`, if it resolves.
    pub(crate) fn get_file(&self, path: &Path, i: usize) -> Option<Arc<VirtualFile>> {
        self.get_node(path, i).map(|n| Arc::clone(n.content()))
    }

    /// Detach and return the subtree at `path`, or `None` when any segment
    /// is unresolved. The caller tombstones the detached files.
    pub(crate) fn remove(&mut self, path: &Path, i: usize) -> Option<FileNode> {
        if i >= path.len() {
            return None;
        }
        let FileNode::Directory { children, .. } = self else {
            return None;
        };
        let segment = path.segment(i);
        if i == path.len() - 1 {
            children.remove(segment)
        } else {
            children.get_mut(segment)?.remove(path, i + 1)
        }
    }

    /// Collect every content object in the subtree, this node's included.
    pub(crate) fn collect_files(&self, out: &mut Vec<Arc<VirtualFile>>) {
        out.push(Arc::clone(self.content()));
        if let FileNode::Directory { children, .. } = self {
            for child in children.values() {
                child.collect_files(out);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
