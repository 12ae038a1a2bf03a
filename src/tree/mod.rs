//! Share Tree
//!
//! In-memory mirror of the shared directories. Nodes live in an arena owned
//! by [`FileTree`]; children are kept sorted by name so lookups are binary
//! searches and refreshes can merge two trees in a single ordered pass.
//!
//! Every mutation keeps two aggregates consistent along the ancestor chain:
//! directory `size` (sum of all descendant file sizes) and the parent's
//! `has_hash` counter (subdirectories plus hashed direct files).

pub mod node;
pub mod path;
pub mod walker;

pub use node::{DirInfo, FileInfo, Node, NodeId, NodeKind};

use crate::error::TreeError;
use crate::types::Tth;
use node::is_valid_name;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Slot {
    epoch: u32,
    node: Option<Node>,
}

/// Arena-backed file tree
#[derive(Debug, Clone)]
pub struct FileTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    by_tth: HashMap<Tth, Vec<NodeId>>,
}

impl Default for FileTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTree {
    /// Empty tree with an unnamed root directory
    pub fn new() -> Self {
        Self::from_root(Node::directory(""))
    }

    /// Empty tree whose root directory carries a name (scan trees use the share name)
    pub fn with_root_name(name: impl Into<String>) -> Self {
        Self::from_root(Node::directory(name))
    }

    fn from_root(mut node: Node) -> Self {
        node.parent = None;
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId { slot: 0, epoch: 0 },
            by_tth: HashMap::new(),
        };
        let tth = node.tth();
        tree.root = tree.alloc(node);
        if let Some(tth) = tth {
            tree.index(tth, tree.root);
        }
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &Node {
        // The root slot is never released.
        self.slots[self.root.slot as usize]
            .node
            .as_ref()
            .expect("root slot is always occupied")
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root_node().children().is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.slot as usize)
            .filter(|slot| slot.epoch == id.epoch)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.slot as usize)
            .filter(|slot| slot.epoch == id.epoch)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(Node::children).unwrap_or(&[])
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.node = Some(node);
            NodeId {
                slot,
                epoch: entry.epoch,
            }
        } else {
            let slot = self.slots.len() as u32;
            self.slots.push(Slot {
                epoch: 0,
                node: Some(node),
            });
            NodeId { slot, epoch: 0 }
        }
    }

    fn release(&mut self, id: NodeId) -> Option<Node> {
        let entry = self.slots.get_mut(id.slot as usize)?;
        if entry.epoch != id.epoch {
            return None;
        }
        let node = entry.node.take()?;
        entry.epoch = entry.epoch.wrapping_add(1);
        self.free.push(id.slot);
        Some(node)
    }

    fn index(&mut self, tth: Tth, id: NodeId) {
        self.by_tth.entry(tth).or_default().push(id);
    }

    fn unindex(&mut self, tth: Tth, id: NodeId) {
        if let Some(ids) = self.by_tth.get_mut(&tth) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_tth.remove(&tth);
            }
        }
    }

    fn name_of(&self, id: NodeId) -> &str {
        self.get(id).map(Node::name).unwrap_or("")
    }

    fn search(&self, children: &[NodeId], name: &str) -> Result<usize, usize> {
        children.binary_search_by(|child| self.name_of(*child).cmp(name))
    }

    /// Sorted lookup of a direct child by name
    pub fn find_child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        let children = self.get(dir)?.children();
        self.search(children, name).ok().map(|pos| children[pos])
    }

    /// Resolve a slash-separated virtual path from the root
    pub fn find_by_path(&self, virtual_path: &str) -> Option<NodeId> {
        let mut current = self.root;
        for component in path::components(virtual_path) {
            current = self.find_child(current, component)?;
        }
        Some(current)
    }

    /// All file nodes currently carrying the given hash
    pub fn find_by_tth(&self, tth: &Tth) -> &[NodeId] {
        self.by_tth.get(tth).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Virtual path of a node (`/` for the root)
    pub fn path_of(&self, id: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.get(parent)?;
        }
        if names.is_empty() {
            return Some("/".to_string());
        }
        names.reverse();
        Some(names.iter().fold(String::new(), |mut acc, name| {
            acc.push('/');
            acc.push_str(name);
            acc
        }))
    }

    /// Insert a detached node under `parent` at its sorted position.
    ///
    /// Directories are always inserted empty; use [`FileTree::insert_subtree`]
    /// to copy a populated directory.
    pub fn insert(&mut self, parent: NodeId, mut node: Node) -> Result<NodeId, TreeError> {
        if !is_valid_name(&node.name) {
            return Err(TreeError::InvalidName(node.name));
        }
        let pos = {
            let parent_node = self.get(parent).ok_or(TreeError::NotFound)?;
            let NodeKind::Directory(dir) = &parent_node.kind else {
                return Err(TreeError::NotADirectory(parent_node.name.clone()));
            };
            match self.search(&dir.children, &node.name) {
                Ok(_) => return Err(TreeError::DuplicateName(node.name)),
                Err(pos) => pos,
            }
        };

        node.parent = Some(parent);
        if let NodeKind::Directory(dir) = &mut node.kind {
            dir.children.clear();
            dir.has_hash = 0;
            node.size = 0;
        }
        let size = node.size;
        let counts = node.counts_as_hashed();
        let tth = node.tth();

        let id = self.alloc(node);
        if let Some(NodeKind::Directory(dir)) = self.get_mut(parent).map(|n| &mut n.kind) {
            dir.children.insert(pos, id);
            if counts {
                dir.has_hash += 1;
            }
        }
        self.grow(Some(parent), size);
        if let Some(tth) = tth {
            self.index(tth, id);
        }
        Ok(id)
    }

    /// Detach a node from its parent and free its whole subtree.
    ///
    /// Returns the hashes of every hashed file that was removed so callers
    /// can drop the matching hash cache entries.
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<Tth>, TreeError> {
        if id == self.root {
            return Err(TreeError::RootRemoval);
        }
        let (parent, size, counts, name) = {
            let node = self.get(id).ok_or(TreeError::NotFound)?;
            (
                node.parent,
                node.size,
                node.counts_as_hashed(),
                node.name.clone(),
            )
        };

        if let Some(parent) = parent {
            let pos = {
                let children = self.children(parent);
                self.search(children, &name)
                    .ok()
                    .filter(|pos| children[*pos] == id)
            };
            if let Some(NodeKind::Directory(dir)) = self.get_mut(parent).map(|n| &mut n.kind) {
                if let Some(pos) = pos {
                    dir.children.remove(pos);
                }
                if counts {
                    dir.has_hash -= 1;
                }
            }
            self.shrink(Some(parent), size);
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.release(current) else {
                continue;
            };
            match node.kind {
                NodeKind::Directory(dir) => stack.extend(dir.children),
                NodeKind::File(file) => {
                    if let Some(tth) = file.tth {
                        self.unindex(tth, current);
                        removed.push(tth);
                    }
                }
            }
        }
        Ok(removed)
    }

    /// Deep value copy of a subtree, with no link back to this tree
    pub fn copy_subtree(&self, id: NodeId) -> Result<FileTree, TreeError> {
        let source = self.get(id).ok_or(TreeError::NotFound)?;
        let mut copy = FileTree::from_root(detached_copy(source));
        if source.is_dir() {
            let root = copy.root;
            copy.copy_children_from(self, id, root)?;
        }
        Ok(copy)
    }

    /// Copy `source_id` (and everything below it) from another tree under `parent`
    pub fn insert_subtree(
        &mut self,
        parent: NodeId,
        source: &FileTree,
        source_id: NodeId,
    ) -> Result<NodeId, TreeError> {
        let node = source.get(source_id).ok_or(TreeError::NotFound)?;
        let id = self.insert(parent, detached_copy(node))?;
        if node.is_dir() {
            self.copy_children_from(source, source_id, id)?;
        }
        Ok(id)
    }

    fn copy_children_from(
        &mut self,
        source: &FileTree,
        source_dir: NodeId,
        target_dir: NodeId,
    ) -> Result<(), TreeError> {
        for &child in source.children(source_dir) {
            self.insert_subtree(target_dir, source, child)?;
        }
        Ok(())
    }

    /// Record a completed hash on a file node
    pub fn set_hash(&mut self, id: NodeId, tth: Tth, last_modified: u64) -> Result<(), TreeError> {
        let (previous, parent) = {
            let node = self.get_mut(id).ok_or(TreeError::NotFound)?;
            let parent = node.parent;
            let NodeKind::File(file) = &mut node.kind else {
                return Err(TreeError::NotAFile(node.name.clone()));
            };
            let previous = file.tth.replace(tth);
            file.last_modified = last_modified;
            (previous, parent)
        };
        match previous {
            Some(old) => self.unindex(old, id),
            None => self.bump_has_hash(parent, true),
        }
        self.index(tth, id);
        Ok(())
    }

    /// Forget a file's hash, returning the hash it had
    pub fn clear_hash(&mut self, id: NodeId) -> Result<Option<Tth>, TreeError> {
        let (previous, parent) = {
            let node = self.get_mut(id).ok_or(TreeError::NotFound)?;
            let parent = node.parent;
            let NodeKind::File(file) = &mut node.kind else {
                return Err(TreeError::NotAFile(node.name.clone()));
            };
            (file.tth.take(), parent)
        };
        if let Some(old) = previous {
            self.unindex(old, id);
            self.bump_has_hash(parent, false);
        }
        Ok(previous)
    }

    pub fn set_last_modified(&mut self, id: NodeId, last_modified: u64) -> Result<(), TreeError> {
        let node = self.get_mut(id).ok_or(TreeError::NotFound)?;
        match &mut node.kind {
            NodeKind::File(file) => {
                file.last_modified = last_modified;
                Ok(())
            }
            NodeKind::Directory(_) => Err(TreeError::NotAFile(node.name.clone())),
        }
    }

    pub fn set_incomplete(&mut self, id: NodeId, incomplete: bool) -> Result<(), TreeError> {
        let node = self.get_mut(id).ok_or(TreeError::NotFound)?;
        match &mut node.kind {
            NodeKind::Directory(dir) => {
                dir.incomplete = incomplete;
                Ok(())
            }
            NodeKind::File(_) => Err(TreeError::NotADirectory(node.name.clone())),
        }
    }

    /// Pre-order list of `id` and all of its descendants
    pub fn walk(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children().iter().rev());
        }
        out
    }

    /// All file nodes at or below `id`
    pub fn files_under(&self, id: NodeId) -> Vec<NodeId> {
        self.walk(id)
            .into_iter()
            .filter(|n| self.get(*n).is_some_and(Node::is_file))
            .collect()
    }

    fn grow(&mut self, mut current: Option<NodeId>, delta: u64) {
        if delta == 0 {
            return;
        }
        while let Some(id) = current {
            let Some(node) = self.get_mut(id) else { break };
            node.size += delta;
            current = node.parent;
        }
    }

    fn shrink(&mut self, mut current: Option<NodeId>, delta: u64) {
        if delta == 0 {
            return;
        }
        while let Some(id) = current {
            let Some(node) = self.get_mut(id) else { break };
            debug_assert!(node.size >= delta, "directory size underflow");
            node.size = node.size.saturating_sub(delta);
            current = node.parent;
        }
    }

    fn bump_has_hash(&mut self, parent: Option<NodeId>, up: bool) {
        let Some(parent) = parent else { return };
        if let Some(NodeKind::Directory(dir)) = self.get_mut(parent).map(|n| &mut n.kind) {
            if up {
                dir.has_hash += 1;
            } else {
                dir.has_hash -= 1;
            }
        }
    }

    /// Check the structural invariants, returning a description of each violation
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for id in self.walk(self.root) {
            let Some(node) = self.get(id) else { continue };
            let NodeKind::Directory(dir) = &node.kind else {
                continue;
            };
            let label = self.path_of(id).unwrap_or_default();
            let mut size = 0u64;
            let mut hashed = 0usize;
            for window in dir.children.windows(2) {
                if self.name_of(window[0]) >= self.name_of(window[1]) {
                    problems.push(format!("{}: children out of order", label));
                }
            }
            for &child in &dir.children {
                match self.get(child) {
                    Some(c) => {
                        size += c.size;
                        hashed += usize::from(c.counts_as_hashed());
                        if c.parent != Some(id) {
                            problems.push(format!("{}/{}: wrong parent link", label, c.name));
                        }
                    }
                    None => problems.push(format!("{}: dangling child", label)),
                }
            }
            if size != node.size {
                problems.push(format!(
                    "{}: size {} but children sum to {}",
                    label, node.size, size
                ));
            }
            if hashed != dir.has_hash {
                problems.push(format!(
                    "{}: has_hash {} but counted {}",
                    label, dir.has_hash, hashed
                ));
            }
        }
        problems
    }
}

/// Copy a node's own fields without its position in a tree
fn detached_copy(node: &Node) -> Node {
    let kind = match &node.kind {
        NodeKind::File(file) => NodeKind::File(file.clone()),
        NodeKind::Directory(dir) => NodeKind::Directory(DirInfo {
            children: Vec::new(),
            has_hash: 0,
            incomplete: dir.incomplete,
        }),
    };
    Node {
        name: node.name.clone(),
        parent: None,
        size: if node.is_file() { node.size } else { 0 },
        kind,
    }
}
