//! Persistence layer for the hash cache

use crate::error::StorageError;
use crate::store::{HashInfo, HashStore};
use crate::types::{Tth, TTH_LEN};
use sled::transaction::{TransactionError, TransactionResult};
use sled::Transactional;
use std::path::Path;
use tracing::{debug, warn};

const INFO_TREE: &str = "info";
const BLOCKS_TREE: &str = "blocks";

/// Sled-based implementation of HashStore
pub struct SledHashCache {
    db: sled::Db,
    info: sled::Tree,
    blocks: sled::Tree,
}

impl SledHashCache {
    /// Open (or create) the cache database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            StorageError::Database(format!(
                "Failed to open hash cache at {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let info = db.open_tree(INFO_TREE)?;
        let blocks = db.open_tree(BLOCKS_TREE)?;
        Ok(Self { db, info, blocks })
    }

    /// Throw away whatever is at `path` and open a fresh, empty cache.
    ///
    /// Used when the file list cannot be loaded: without the tree there is
    /// no way to tell which cached entries are still referenced.
    pub fn recreate<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if path.is_dir() {
            warn!(path = %path.display(), "Discarding hash cache");
            std::fs::remove_dir_all(path)?;
        } else if path.exists() {
            warn!(path = %path.display(), "Discarding hash cache");
            std::fs::remove_file(path)?;
        }
        Self::open(path)
    }
}

fn encode_blocks(blocks: &[Tth]) -> Vec<u8> {
    let mut out = Vec::with_capacity(blocks.len() * TTH_LEN);
    for block in blocks {
        out.extend_from_slice(block.as_bytes());
    }
    out
}

fn decode_blocks(tth: &Tth, raw: &[u8]) -> Result<Vec<Tth>, StorageError> {
    if raw.len() % TTH_LEN != 0 {
        return Err(StorageError::Corrupt(format!(
            "BLOCKS record for {} is {} bytes, not a multiple of {}",
            tth,
            raw.len(),
            TTH_LEN
        )));
    }
    Ok(raw.chunks_exact(TTH_LEN).filter_map(Tth::from_bytes).collect())
}

impl HashStore for SledHashCache {
    fn get_info(&self, tth: &Tth) -> Result<Option<HashInfo>, StorageError> {
        match self.info.get(tth.as_bytes())? {
            Some(value) => {
                let info: HashInfo = bincode::deserialize(&value).map_err(|e| {
                    StorageError::Corrupt(format!("INFO record for {}: {}", tth, e))
                })?;
                Ok(Some(info))
            }
            None => Ok(None),
        }
    }

    fn get_blocks(&self, tth: &Tth) -> Result<Option<Vec<Tth>>, StorageError> {
        match self.blocks.get(tth.as_bytes())? {
            Some(value) => decode_blocks(tth, &value).map(Some),
            None => Ok(None),
        }
    }

    fn store(&self, tth: &Tth, info: &HashInfo, blocks: &[Tth]) -> Result<(), StorageError> {
        let expected = info.expected_blocks();
        if blocks.len() as u64 != expected {
            return Err(StorageError::Corrupt(format!(
                "{} has {} block hashes, expected {} for {} bytes at block size {}",
                tth,
                blocks.len(),
                expected,
                info.size,
                info.block_size
            )));
        }

        let info_value = bincode::serialize(info).map_err(|e| {
            StorageError::Corrupt(format!("Failed to serialize INFO record: {}", e))
        })?;
        let blocks_value = encode_blocks(blocks);
        let key = tth.as_bytes();

        let result: TransactionResult<()> =
            (&self.info, &self.blocks).transaction(|(info_tree, blocks_tree)| {
                info_tree.insert(&key[..], info_value.as_slice())?;
                blocks_tree.insert(&key[..], blocks_value.as_slice())?;
                Ok(())
            });
        result.map_err(transaction_error)?;
        debug!(tth = %tth, size = info.size, blocks = blocks.len(), "Stored hash");
        Ok(())
    }

    fn delete(&self, tth: &Tth) -> Result<(), StorageError> {
        let key = tth.as_bytes();
        let result: TransactionResult<()> =
            (&self.info, &self.blocks).transaction(|(info_tree, blocks_tree)| {
                info_tree.remove(&key[..])?;
                blocks_tree.remove(&key[..])?;
                Ok(())
            });
        result.map_err(transaction_error)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.info.len()
    }
}

fn transaction_error(err: TransactionError<()>) -> StorageError {
    match err {
        TransactionError::Abort(()) => StorageError::Database("transaction aborted".to_string()),
        TransactionError::Storage(e) => StorageError::from(e),
    }
}
