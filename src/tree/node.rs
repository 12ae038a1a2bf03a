//! File and directory node types

use crate::types::Tth;

/// Handle into a [`FileTree`](super::FileTree) arena.
///
/// The epoch is bumped whenever a slot is freed, so a handle to a removed
/// node never resolves to whatever later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) slot: u32,
    pub(crate) epoch: u32,
}

/// File-only fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Filesystem mtime (seconds since the Unix epoch) at scan or hash time
    pub last_modified: u64,
    /// Root hash, present once the file has been hashed
    pub tth: Option<Tth>,
}

/// Directory-only fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirInfo {
    /// Children sorted by name (byte order)
    pub(crate) children: Vec<NodeId>,
    /// Subdirectories plus directly contained files that have a hash
    pub(crate) has_hash: usize,
    /// Set on directories that a loaded file list declared incomplete
    pub incomplete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    File(FileInfo),
    Directory(DirInfo),
}

/// A file or directory in the share tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    /// File length, or for directories the sum over all descendant files
    pub(crate) size: u64,
    pub(crate) kind: NodeKind,
}

impl Node {
    /// Detached, unhashed file node.
    pub fn file(name: impl Into<String>, size: u64, last_modified: u64) -> Self {
        Self {
            name: name.into(),
            parent: None,
            size,
            kind: NodeKind::File(FileInfo {
                last_modified,
                tth: None,
            }),
        }
    }

    /// Detached file node that already carries its hash.
    pub fn hashed_file(name: impl Into<String>, size: u64, last_modified: u64, tth: Tth) -> Self {
        Self {
            name: name.into(),
            parent: None,
            size,
            kind: NodeKind::File(FileInfo {
                last_modified,
                tth: Some(tth),
            }),
        }
    }

    /// Detached, empty directory node.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            size: 0,
            kind: NodeKind::Directory(DirInfo::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory(_))
    }

    pub fn tth(&self) -> Option<Tth> {
        match &self.kind {
            NodeKind::File(file) => file.tth,
            NodeKind::Directory(_) => None,
        }
    }

    pub fn last_modified(&self) -> Option<u64> {
        match &self.kind {
            NodeKind::File(file) => Some(file.last_modified),
            NodeKind::Directory(_) => None,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Directory(dir) => &dir.children,
            NodeKind::File(_) => &[],
        }
    }

    /// Hash-completeness counter for directories; 1 or 0 for files.
    pub fn has_hash(&self) -> usize {
        match &self.kind {
            NodeKind::Directory(dir) => dir.has_hash,
            NodeKind::File(file) => usize::from(file.tth.is_some()),
        }
    }

    /// Whether this node counts towards its parent's `has_hash`.
    pub(crate) fn counts_as_hashed(&self) -> bool {
        match &self.kind {
            NodeKind::Directory(_) => true,
            NodeKind::File(file) => file.tth.is_some(),
        }
    }

    /// A directory is complete when every child is either a subdirectory
    /// or a hashed file and it was not loaded as incomplete.
    pub fn is_complete(&self) -> bool {
        match &self.kind {
            NodeKind::Directory(dir) => !dir.incomplete && dir.has_hash == dir.children.len(),
            NodeKind::File(file) => file.tth.is_some(),
        }
    }
}

/// Name rules shared by the tree and the file list loader
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}
