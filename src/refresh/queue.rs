//! Pending hash jobs

use crate::hasher::HashJob;

/// LIFO queue of files waiting to be hashed, with a running byte total
#[derive(Debug, Default)]
pub struct HashQueue {
    jobs: Vec<HashJob>,
    queued_bytes: u64,
}

impl HashQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: HashJob) {
        self.queued_bytes += job.size;
        self.jobs.push(job);
    }

    /// Most recently queued job first
    pub fn pop(&mut self) -> Option<HashJob> {
        let job = self.jobs.pop()?;
        self.queued_bytes -= job.size;
        Some(job)
    }

    /// Drop every pending job, returning how many there were
    pub fn clear(&mut self) -> usize {
        let dropped = self.jobs.len();
        self.jobs.clear();
        self.queued_bytes = 0;
        dropped
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn queued_bytes(&self) -> u64 {
        self.queued_bytes
    }
}
