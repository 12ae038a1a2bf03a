//! Hash Cache
//!
//! Persistent record of finished hashes, keyed by the file's TTH. Each key
//! has two records: `INFO` (mtime, size, block size) and `BLOCKS` (the
//! per-block hashes peers use to verify downloads). Paths are never stored;
//! the live tree is the only place that knows where a TTH lives.

pub mod persistence;

pub use persistence::SledHashCache;

use crate::error::StorageError;
use crate::tth::block_count;
use crate::types::Tth;
use serde::{Deserialize, Serialize};

/// Metadata recorded for a hashed file.
///
/// Encoded with bincode's fixed-width little-endian integers, so the record
/// is exactly three `u64`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashInfo {
    pub last_modified: u64,
    pub size: u64,
    pub block_size: u64,
}

impl HashInfo {
    /// Number of block hashes a complete `BLOCKS` record carries
    pub fn expected_blocks(&self) -> u64 {
        block_count(self.size, self.block_size)
    }
}

/// Hash cache interface
pub trait HashStore: Send {
    fn get_info(&self, tth: &Tth) -> Result<Option<HashInfo>, StorageError>;

    fn get_blocks(&self, tth: &Tth) -> Result<Option<Vec<Tth>>, StorageError>;

    /// Write both records for `tth`, replacing any previous ones.
    fn store(&self, tth: &Tth, info: &HashInfo, blocks: &[Tth]) -> Result<(), StorageError>;

    /// Remove both records for `tth`. Removing a missing key is not an error.
    fn delete(&self, tth: &Tth) -> Result<(), StorageError>;

    /// Sync everything written so far to disk
    fn flush(&self) -> Result<(), StorageError>;

    /// Number of cached files
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
