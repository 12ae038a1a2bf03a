//! Messages between the background workers, the control thread and observers.

use crate::error::{HashError, ScanError};
use crate::hasher::{HashJob, HashOutput};
use crate::tree::walker::ScanReport;
use crate::types::Tth;
use serde::Serialize;
use std::path::PathBuf;

/// A directory to rescan and where its result merges into the live tree
#[derive(Debug, Clone)]
pub struct ScanTarget {
    pub share: String,
    /// Virtual path of the directory in the live tree
    pub virtual_path: String,
    /// Filesystem directory to walk
    pub path: PathBuf,
}

/// Completion posted back to the control thread
#[derive(Debug)]
pub enum WorkerEvent {
    ScanFinished {
        generation: u64,
        target: ScanTarget,
        result: Result<ScanReport, ScanError>,
    },
    HashFinished {
        job: HashJob,
        result: Result<HashOutput, HashError>,
    },
}

impl WorkerEvent {
    pub fn generation(&self) -> u64 {
        match self {
            WorkerEvent::ScanFinished { generation, .. } => *generation,
            WorkerEvent::HashFinished { job, .. } => job.generation,
        }
    }
}

/// Progress reported to subscribers (the UI layer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    RefreshStarted {
        generation: u64,
        targets: Vec<String>,
    },
    ScanFailed {
        path: String,
        reason: String,
    },
    HashCompleted {
        path: String,
        size: u64,
        tth: Tth,
        elapsed_ms: u64,
        bytes_per_sec: u64,
    },
    HashFailed {
        path: String,
        reason: String,
    },
    RefreshFinished {
        generation: u64,
        hashed: usize,
        failed: usize,
        elapsed_ms: u64,
    },
}
