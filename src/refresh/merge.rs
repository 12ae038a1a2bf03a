//! Merging a scan tree into the live tree.
//!
//! Both sides keep children sorted by name, so one ordered pass over each
//! directory pairs up entries: names only on the live side are removed,
//! names only on the scan side are copied in and queued for hashing, and
//! matching names are compared. A name whose kind changed (file became a
//! directory or the reverse) is handled as a removal followed by an insert.

use crate::error::TreeError;
use crate::hasher::HashJob;
use crate::refresh::queue::HashQueue;
use crate::store::HashStore;
use crate::tree::{FileTree, Node, NodeId};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Counts of what one merge changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub removed: usize,
    /// Existing files queued again (changed or never hashed)
    pub requeued: usize,
    pub unchanged: usize,
}

impl MergeStats {
    pub fn changed(&self) -> bool {
        self.added + self.removed + self.requeued > 0
    }
}

/// Everything a merge pass writes to besides the live tree
pub struct MergeContext<'a> {
    pub cache: &'a dyn HashStore,
    pub queue: &'a mut HashQueue,
    pub generation: u64,
    pub stats: MergeStats,
}

impl<'a> MergeContext<'a> {
    pub fn new(cache: &'a dyn HashStore, queue: &'a mut HashQueue, generation: u64) -> Self {
        Self {
            cache,
            queue,
            generation,
            stats: MergeStats::default(),
        }
    }

    fn enqueue(&mut self, live: &FileTree, id: NodeId, path: PathBuf) {
        let Some(node) = live.get(id) else { return };
        let virtual_path = live.path_of(id).unwrap_or_default();
        trace!(path = %virtual_path, size = node.size(), "Queued for hashing");
        self.queue.push(HashJob {
            node: id,
            path,
            virtual_path,
            size: node.size(),
            generation: self.generation,
        });
    }

    /// Queue every file at or below `id`, whose filesystem location is `path`
    fn enqueue_subtree(&mut self, live: &FileTree, id: NodeId, path: PathBuf) {
        let Some(node) = live.get(id) else { return };
        if node.is_file() {
            self.enqueue(live, id, path);
            return;
        }
        for &child in node.children() {
            if let Some(child_node) = live.get(child) {
                let child_path = path.join(child_node.name());
                self.enqueue_subtree(live, child, child_path);
            }
        }
    }

    /// Remove a live subtree and drop the cache entries of its hashed files
    fn remove(&mut self, live: &mut FileTree, id: NodeId) -> Result<(), TreeError> {
        for tth in live.remove(id)? {
            if let Err(e) = self.cache.delete(&tth) {
                warn!(tth = %tth, "Failed to delete hash cache entry: {}", e);
            }
        }
        self.stats.removed += 1;
        Ok(())
    }

    /// Copy a scanned subtree under `parent` and queue its files
    fn add(
        &mut self,
        live: &mut FileTree,
        parent: NodeId,
        scan: &FileTree,
        scan_id: NodeId,
        path: PathBuf,
    ) -> Result<NodeId, TreeError> {
        let id = live.insert_subtree(parent, scan, scan_id)?;
        self.enqueue_subtree(live, id, path);
        self.stats.added += 1;
        Ok(id)
    }
}

/// Add a share that the live tree does not have yet
pub fn insert_share(
    live: &mut FileTree,
    scan: &FileTree,
    path: &Path,
    ctx: &mut MergeContext<'_>,
) -> Result<NodeId, TreeError> {
    let root = live.root();
    ctx.add(live, root, scan, scan.root(), path.to_path_buf())
}

/// Merge the children of `scan_dir` into `live_dir`.
///
/// `path` is the filesystem directory both nodes describe. The live
/// directory loses any `incomplete` flag it carried from a loaded list.
pub fn merge_directory(
    live: &mut FileTree,
    live_dir: NodeId,
    scan: &FileTree,
    scan_dir: NodeId,
    path: &Path,
    ctx: &mut MergeContext<'_>,
) -> Result<(), TreeError> {
    live.set_incomplete(live_dir, false)?;

    // Ids stay valid while siblings are inserted or removed
    let live_children = live.children(live_dir).to_vec();
    let scan_children = scan.children(scan_dir);
    let (mut i, mut j) = (0, 0);

    while i < live_children.len() || j < scan_children.len() {
        let live_id = live_children.get(i).copied();
        let scan_id = scan_children.get(j).copied();
        let order = match (live_id, scan_id) {
            (Some(l), Some(s)) => name(live, l).cmp(name(scan, s)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match order {
            Ordering::Less => {
                // Only in the live tree: gone from disk
                if let Some(l) = live_id {
                    debug!(path = ?live.path_of(l), "Removing entry no longer on disk");
                    ctx.remove(live, l)?;
                }
                i += 1;
            }
            Ordering::Greater => {
                // Only in the scan: new on disk
                if let Some(s) = scan_id {
                    let child_path = path.join(name(scan, s));
                    ctx.add(live, live_dir, scan, s, child_path)?;
                }
                j += 1;
            }
            Ordering::Equal => {
                if let (Some(l), Some(s)) = (live_id, scan_id) {
                    merge_entry(live, live_dir, l, scan, s, path, ctx)?;
                }
                i += 1;
                j += 1;
            }
        }
    }
    Ok(())
}

fn merge_entry(
    live: &mut FileTree,
    live_dir: NodeId,
    live_id: NodeId,
    scan: &FileTree,
    scan_id: NodeId,
    dir_path: &Path,
    ctx: &mut MergeContext<'_>,
) -> Result<(), TreeError> {
    let (Some(live_node), Some(scan_node)) = (live.get(live_id), scan.get(scan_id)) else {
        return Err(TreeError::NotFound);
    };
    let child_path = dir_path.join(scan_node.name());

    match (live_node.is_dir(), scan_node.is_dir()) {
        (true, true) => merge_directory(live, live_id, scan, scan_id, &child_path, ctx),
        (false, false) => {
            if is_unchanged(live_node, scan_node) {
                ctx.stats.unchanged += 1;
                return Ok(());
            }
            if live_node.size() == scan_node.size()
                && live_node.last_modified() == scan_node.last_modified()
            {
                // Same file, just never hashed
                ctx.enqueue(live, live_id, child_path);
                ctx.stats.requeued += 1;
                return Ok(());
            }
            // Changed on disk: swap in the scanned node so size and mtime
            // are current, and forget the stale hash
            for tth in live.remove(live_id)? {
                if let Err(e) = ctx.cache.delete(&tth) {
                    warn!(tth = %tth, "Failed to delete hash cache entry: {}", e);
                }
            }
            let id = live.insert_subtree(live_dir, scan, scan_id)?;
            ctx.enqueue(live, id, child_path);
            ctx.stats.requeued += 1;
            Ok(())
        }
        _ => {
            debug!(path = %child_path.display(), "Entry changed kind, replacing");
            ctx.remove(live, live_id)?;
            ctx.add(live, live_dir, scan, scan_id, child_path)?;
            Ok(())
        }
    }
}

fn is_unchanged(live: &Node, scan: &Node) -> bool {
    live.tth().is_some()
        && live.size() == scan.size()
        && live.last_modified() == scan.last_modified()
}

fn name(tree: &FileTree, id: NodeId) -> &str {
    tree.get(id).map(Node::name).unwrap_or("")
}
