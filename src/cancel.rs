//! Refresh generations and cancellation tokens.
//!
//! Every refresh takes a new generation number. Background jobs carry a
//! [`CancellationToken`] for the generation they were created under; once a
//! newer refresh starts, the token reports cancelled and any result the job
//! still produces is discarded by the control thread.
//!
//! ## Sparse Checking
//!
//! Tight loops can use `is_cancelled_sparse()`, which only reads the atomic
//! every `CANCEL_CHECK_INTERVAL` iterations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How often long-running loops should check whether execution was cancelled.
/// Using a power of 2 allows efficient modulo via bitwise AND.
pub const CANCEL_CHECK_INTERVAL: usize = 0x400; // 1,024

/// Monotonic refresh generation shared between the control thread and workers
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    active: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation, invalidating every token issued before it.
    pub fn next_generation(&self) -> u64 {
        self.active.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }

    /// Token that stays valid until the generation moves past `generation`.
    pub fn token(&self, generation: u64) -> CancellationToken {
        CancellationToken {
            active: Some(Arc::clone(&self.active)),
            generation,
        }
    }
}

/// Per-job view of the generation counter
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    active: Option<Arc<AtomicU64>>,
    generation: u64,
}

impl CancellationToken {
    /// A token that is never cancelled.
    pub fn noop() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        match &self.active {
            Some(active) => active.load(Ordering::Relaxed) != self.generation,
            None => false,
        }
    }

    /// Sparse cancellation check, only reads the counter every
    /// `CANCEL_CHECK_INTERVAL` iterations.
    #[inline]
    pub fn is_cancelled_sparse(&self, counter: usize) -> bool {
        counter & (CANCEL_CHECK_INTERVAL - 1) == 0 && self.is_cancelled()
    }
}
