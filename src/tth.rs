//! Tiger Tree Hash
//!
//! Merkle tree over 1024-byte segments using the Tiger digest (THEX):
//! leaves are `tiger(0x00 || segment)`, internal nodes are
//! `tiger(0x01 || left || right)`, and an unpaired node is promoted to the
//! next level unchanged. An empty input hashes as a single empty leaf.
//!
//! Besides the root, the accumulator keeps the hashes at the level of
//! `block_size` (a power-of-two multiple of the segment size chosen from
//! the file size) so peers can verify downloads block by block.

use crate::types::{Tth, TTH_LEN};
use tiger::{Digest, Tiger};

/// Size of a THEX leaf segment
pub const SEGMENT_SIZE: u64 = 1024;

/// Upper bound on the number of stored block hashes per file
pub const MAX_BLOCKS: u64 = 512;

/// Smallest power-of-two multiple of `SEGMENT_SIZE` that covers the file in
/// at most `MAX_BLOCKS` blocks.
pub fn block_size(file_size: u64) -> u64 {
    let mut size = SEGMENT_SIZE;
    while size.saturating_mul(MAX_BLOCKS) < file_size {
        size <<= 1;
    }
    size
}

/// Number of block hashes stored for a file; never zero.
pub fn block_count(file_size: u64, block_size: u64) -> u64 {
    file_size.div_ceil(block_size).max(1)
}

fn finalize(hasher: Tiger) -> Tth {
    let digest = hasher.finalize();
    let mut out = [0u8; TTH_LEN];
    out.copy_from_slice(&digest);
    Tth(out)
}

pub fn leaf_hash(segment: &[u8]) -> Tth {
    let mut hasher = Tiger::new();
    hasher.update([0x00]);
    hasher.update(segment);
    finalize(hasher)
}

pub fn internal_hash(left: &Tth, right: &Tth) -> Tth {
    let mut hasher = Tiger::new();
    hasher.update([0x01]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    finalize(hasher)
}

/// Incremental Merkle reduction: a stack of (level, hash) where equal
/// levels are combined as soon as they meet.
#[derive(Debug, Default, Clone)]
struct MerkleStack {
    stack: Vec<(u32, Tth)>,
}

impl MerkleStack {
    fn push(&mut self, hash: Tth) {
        let mut level = 0;
        let mut hash = hash;
        while let Some(&(top_level, left)) = self.stack.last() {
            if top_level != level {
                break;
            }
            self.stack.pop();
            hash = internal_hash(&left, &hash);
            level += 1;
        }
        self.stack.push((level, hash));
    }

    fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Fold what is left right-to-left; promoted nodes join at the level
    /// where they meet their left neighbour.
    fn finish(&mut self) -> Option<Tth> {
        let (_, mut hash) = self.stack.pop()?;
        while let Some((_, left)) = self.stack.pop() {
            hash = internal_hash(&left, &hash);
        }
        Some(hash)
    }
}

/// Result of hashing a complete input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeHash {
    pub root: Tth,
    pub blocks: Vec<Tth>,
    pub block_size: u64,
}

/// Streaming TTH accumulator
#[derive(Debug, Clone)]
pub struct TigerTree {
    block_size: u64,
    segments_per_block: u64,
    pending: Vec<u8>,
    block: MerkleStack,
    block_segments: u64,
    blocks: Vec<Tth>,
    total: u64,
}

impl TigerTree {
    /// Accumulator for a file of the given size; the size only picks the block size.
    pub fn new(file_size: u64) -> Self {
        Self::with_block_size(block_size(file_size))
    }

    pub fn with_block_size(block_size: u64) -> Self {
        debug_assert!(block_size >= SEGMENT_SIZE && block_size.is_power_of_two());
        Self {
            block_size,
            segments_per_block: block_size / SEGMENT_SIZE,
            pending: Vec::with_capacity(SEGMENT_SIZE as usize),
            block: MerkleStack::default(),
            block_segments: 0,
            blocks: Vec::new(),
            total: 0,
        }
    }

    /// Bytes fed so far
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.total += data.len() as u64;
        let segment = SEGMENT_SIZE as usize;

        if !self.pending.is_empty() {
            let take = (segment - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.pending.len() < segment {
                return;
            }
            let leaf = leaf_hash(&self.pending);
            self.pending.clear();
            self.push_leaf(leaf);
        }

        let mut chunks = data.chunks_exact(segment);
        for chunk in &mut chunks {
            self.push_leaf(leaf_hash(chunk));
        }
        self.pending.extend_from_slice(chunks.remainder());
    }

    fn push_leaf(&mut self, leaf: Tth) {
        self.block.push(leaf);
        self.block_segments += 1;
        if self.block_segments == self.segments_per_block {
            self.close_block();
        }
    }

    fn close_block(&mut self) {
        if let Some(hash) = self.block.finish() {
            self.blocks.push(hash);
        }
        self.block_segments = 0;
    }

    pub fn finish(mut self) -> TreeHash {
        if !self.pending.is_empty() || self.total == 0 {
            let leaf = leaf_hash(&self.pending);
            self.pending.clear();
            self.block.push(leaf);
            self.block_segments += 1;
        }
        if !self.block.is_empty() {
            self.close_block();
        }

        let mut top = MerkleStack::default();
        for block in &self.blocks {
            top.push(*block);
        }
        let root = top.finish().unwrap_or_else(|| leaf_hash(&[]));
        TreeHash {
            root,
            blocks: self.blocks,
            block_size: self.block_size,
        }
    }
}

/// Hash an in-memory buffer
pub fn hash_bytes(data: &[u8]) -> TreeHash {
    let mut tree = TigerTree::new(data.len() as u64);
    tree.update(data);
    tree.finish()
}
