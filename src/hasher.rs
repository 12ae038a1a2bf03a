//! File hashing
//!
//! Streams a file through the TTH accumulator in fixed-size chunks. The
//! size recorded when the job was queued is authoritative: reading past it,
//! or ending short of it, fails the job because the file changed underneath.

use crate::cancel::CancellationToken;
use crate::error::HashError;
use crate::tth::TigerTree;
use crate::types::Tth;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, UNIX_EPOCH};
use tracing::{debug, instrument, trace};

/// Read buffer size per loop iteration
pub const READ_CHUNK: usize = 256 * 1024;

/// A queued file hash
#[derive(Debug, Clone)]
pub struct HashJob {
    pub node: crate::tree::NodeId,
    pub path: PathBuf,
    pub virtual_path: String,
    /// Size recorded when the job was queued
    pub size: u64,
    pub generation: u64,
}

/// Output of a successful hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashOutput {
    pub tth: Tth,
    pub blocks: Vec<Tth>,
    pub block_size: u64,
    pub size: u64,
    /// mtime observed when the file was opened
    pub last_modified: u64,
    pub elapsed: Duration,
}

impl HashOutput {
    pub fn bytes_per_sec(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= f64::EPSILON {
            self.size
        } else {
            (self.size as f64 / secs) as u64
        }
    }
}

/// Seconds since the Unix epoch for a file's mtime, 0 when unavailable
pub fn mtime_secs(metadata: &std::fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Hash `path`, which is expected to be exactly `expected_size` bytes long.
#[instrument(skip(path, token), fields(path = %path.display()))]
pub fn hash_file(
    path: &Path,
    expected_size: u64,
    token: &CancellationToken,
) -> Result<HashOutput, HashError> {
    let started = Instant::now();
    let mut file = File::open(path).map_err(|source| HashError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let last_modified = file.metadata().map(|m| mtime_secs(&m)).unwrap_or(0);

    let mut tree = TigerTree::new(expected_size);
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        if token.is_cancelled() {
            debug!("Hash job superseded, abandoning");
            return Err(HashError::Cancelled);
        }
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(HashError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        tree.update(&buf[..read]);
        if tree.total() > expected_size {
            return Err(HashError::Grew {
                expected: expected_size,
                read: tree.total(),
            });
        }
        trace!(read = tree.total(), "Hashed chunk");
    }

    if tree.total() != expected_size {
        return Err(HashError::SizeMismatch {
            expected: expected_size,
            read: tree.total(),
        });
    }

    let hash = tree.finish();
    Ok(HashOutput {
        tth: hash.root,
        blocks: hash.blocks,
        block_size: hash.block_size,
        size: expected_size,
        last_modified,
        elapsed: started.elapsed(),
    })
}
