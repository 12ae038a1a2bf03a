//! Refresh Coordinator
//!
//! Owns the live tree, the hash queue and the generation counter, and is the
//! only thing that mutates them. A refresh runs as
//! `Idle -> Scanning -> Merging -> Hashing -> Idle`: scans and hashes run on
//! two dedicated worker threads and post their results back through a
//! channel, which the control thread drains in [`RefreshCoordinator::run`],
//! [`RefreshCoordinator::wait_idle`] or [`RefreshCoordinator::process_pending`].
//!
//! Starting a refresh bumps the generation. Jobs created under an older
//! generation abandon their work at the next check, and anything they still
//! deliver is dropped on arrival.

pub mod event;
pub mod merge;
pub mod queue;
pub mod worker;

pub use event::{Notification, ScanTarget, WorkerEvent};
pub use merge::MergeStats;
pub use queue::HashQueue;

use crate::cancel::{CancellationToken, GenerationCounter};
use crate::config::{IndexerConfig, ShareConfig};
use crate::error::{ApiError, FileListError, HashError, ScanError, TreeError};
use crate::filelist;
use crate::hasher::{hash_file, HashJob, HashOutput};
use crate::store::{HashInfo, HashStore, SledHashCache};
use crate::tree::path::{normalize_path_string, split_share, to_fs_path};
use crate::tree::walker::{ScanReport, Walker, WalkerConfig};
use crate::tree::{FileTree, Node, NodeId};
use crate::types::Tth;
use crossbeam_channel::{never, select, tick, unbounded, Receiver, Sender};
use merge::MergeContext;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use worker::Worker;

/// What a refresh rescans
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshTarget {
    /// Every configured share; shares no longer configured are dropped
    All,
    /// A share (`/name`) or a directory inside one (`/name/dir/...`)
    Path(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    #[default]
    Idle,
    Scanning,
    Merging,
    Hashing,
}

/// Snapshot of refresh progress for the UI layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStatus {
    pub state: RefreshState,
    pub refreshing: bool,
    pub generation: u64,
    /// Files waiting to be hashed, including the one being hashed
    pub queued_files: usize,
    pub queued_bytes: u64,
    /// File currently being hashed
    pub current: Option<String>,
    pub hashed: usize,
    pub failed: usize,
}

struct ScanJob {
    generation: u64,
    target: ScanTarget,
    root_name: String,
    config: WalkerConfig,
    token: CancellationToken,
}

/// Per-refresh bookkeeping
#[derive(Debug, Default)]
struct RefreshRun {
    started: Option<Instant>,
    pending_scans: usize,
    hashed: usize,
    failed: usize,
}

pub struct RefreshCoordinator {
    config: IndexerConfig,
    file_list_path: PathBuf,
    tree: FileTree,
    cache: Box<dyn HashStore>,
    generations: GenerationCounter,
    queue: HashQueue,
    in_flight: Option<HashJob>,
    run: RefreshRun,
    state: RefreshState,
    dirty: bool,
    needs_full_refresh: bool,
    status: Arc<RwLock<RefreshStatus>>,
    subscribers: Vec<Sender<Notification>>,
    events: Receiver<WorkerEvent>,
    scan_worker: Worker<ScanJob>,
    hash_worker: Worker<HashJob>,
}

impl RefreshCoordinator {
    /// Load the live tree and open the hash cache.
    ///
    /// A missing or unreadable file list leaves the tree empty and resets the
    /// cache, so no cached hash can outlive the tree that referenced it. A
    /// cache that cannot be opened is fatal.
    #[instrument(skip(config))]
    pub fn open(config: IndexerConfig) -> Result<Self, ApiError> {
        let file_list_path = config.storage.file_list_path();
        let cache_path = config.storage.hash_cache_path();
        std::fs::create_dir_all(&config.storage.data_dir).map_err(|e| {
            ApiError::ConfigError(format!(
                "Failed to create data directory {}: {}",
                config.storage.data_dir.display(),
                e
            ))
        })?;

        let (tree, cache, needs_full_refresh) = match filelist::load(&file_list_path) {
            Ok(tree) => {
                let cache = SledHashCache::open(&cache_path).map_err(|e| {
                    error!(path = %cache_path.display(), "Cannot open hash cache: {}", e);
                    e
                })?;
                (tree, cache, false)
            }
            Err(e) => {
                match &e {
                    FileListError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                        info!(path = %file_list_path.display(), "No file list yet, starting empty");
                    }
                    _ => warn!(
                        path = %file_list_path.display(),
                        "Failed to load file list, starting empty: {}", e
                    ),
                }
                let cache = SledHashCache::recreate(&cache_path).map_err(|e| {
                    error!(path = %cache_path.display(), "Cannot open hash cache: {}", e);
                    e
                })?;
                (FileTree::new(), cache, true)
            }
        };

        Self::with_parts(config, file_list_path, tree, Box::new(cache), needs_full_refresh)
    }

    fn with_parts(
        config: IndexerConfig,
        file_list_path: PathBuf,
        tree: FileTree,
        cache: Box<dyn HashStore>,
        needs_full_refresh: bool,
    ) -> Result<Self, ApiError> {
        let (events_tx, events) = unbounded();
        let generations = GenerationCounter::new();

        let scan_events = events_tx.clone();
        let scan_worker = Worker::spawn("scan-worker", move |job: ScanJob| {
            let walker = Walker::with_config(job.target.path.clone(), job.config);
            let result = walker.scan(&job.root_name, &job.token);
            let _ = scan_events.send(WorkerEvent::ScanFinished {
                generation: job.generation,
                target: job.target,
                result,
            });
        })
        .map_err(ApiError::Worker)?;

        let hash_events = events_tx;
        let hash_generations = generations.clone();
        let hash_worker = Worker::spawn("hash-worker", move |job: HashJob| {
            let token = hash_generations.token(job.generation);
            let result = hash_file(&job.path, job.size, &token);
            let _ = hash_events.send(WorkerEvent::HashFinished { job, result });
        })
        .map_err(ApiError::Worker)?;

        let mut coordinator = Self {
            config,
            file_list_path,
            tree,
            cache,
            generations,
            queue: HashQueue::new(),
            in_flight: None,
            run: RefreshRun::default(),
            state: RefreshState::Idle,
            dirty: false,
            needs_full_refresh,
            status: Arc::new(RwLock::new(RefreshStatus::default())),
            subscribers: Vec::new(),
            events,
            scan_worker,
            hash_worker,
        };
        coordinator.reconcile();
        coordinator.publish_status();
        Ok(coordinator)
    }

    /// Bring a freshly loaded tree in line with the cache and the share list
    fn reconcile(&mut self) {
        let root = self.tree.root();
        let stale_shares: Vec<NodeId> = self
            .tree
            .children(root)
            .iter()
            .copied()
            .filter(|id| {
                self.tree
                    .get(*id)
                    .map_or(false, |node| self.config.share(node.name()).is_none())
            })
            .collect();
        for id in stale_shares {
            info!(share = ?self.tree.path_of(id), "Dropping share that is no longer configured");
            self.remove_with_cache(id);
        }

        let mut restored = 0usize;
        let mut cleared = 0usize;
        for id in self.tree.files_under(root) {
            let Some(node) = self.tree.get(id) else { continue };
            let Some(tth) = node.tth() else { continue };
            let size = node.size();
            match self.cache.get_info(&tth) {
                Ok(Some(info)) if info.size == size => {
                    if let Err(e) = self.tree.set_last_modified(id, info.last_modified) {
                        warn!(tth = %tth, "Failed to restore modification time: {}", e);
                    }
                    restored += 1;
                }
                Ok(_) => self.clear_unverified_hash(id, &tth, &mut cleared),
                Err(e) => {
                    warn!(tth = %tth, "Unreadable hash cache entry: {}", e);
                    self.clear_unverified_hash(id, &tth, &mut cleared);
                }
            }
        }
        if cleared > 0 {
            self.dirty = true;
        }
        debug!(restored, cleared, "Reconciled file list with hash cache");
    }

    fn clear_unverified_hash(&mut self, id: NodeId, tth: &Tth, cleared: &mut usize) {
        match self.tree.clear_hash(id) {
            Ok(_) => *cleared += 1,
            Err(e) => warn!(tth = %tth, "Failed to clear hash missing from cache: {}", e),
        }
    }

    fn remove_with_cache(&mut self, id: NodeId) {
        match self.tree.remove(id) {
            Ok(removed) => {
                for tth in removed {
                    if let Err(e) = self.cache.delete(&tth) {
                        warn!(tth = %tth, "Failed to delete hash cache entry: {}", e);
                    }
                }
                self.dirty = true;
            }
            Err(e) => warn!("Failed to remove node: {}", e),
        }
    }

    /// True when the file list could not be loaded and everything must be rescanned
    pub fn needs_full_refresh(&self) -> bool {
        self.needs_full_refresh
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Receive progress notifications from now on
    pub fn subscribe(&mut self) -> Receiver<Notification> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, notification: Notification) {
        self.subscribers
            .retain(|subscriber| subscriber.send(notification.clone()).is_ok());
    }

    /// Start a refresh, superseding any refresh still in progress.
    ///
    /// Returns the new generation. Shares whose directory cannot be resolved
    /// are reported with [`Notification::ScanFailed`] and left untouched.
    #[instrument(skip(self))]
    pub fn refresh(&mut self, target: RefreshTarget) -> Result<u64, ApiError> {
        let plans = self.plan(&target)?;

        if target == RefreshTarget::All {
            let root = self.tree.root();
            let unconfigured: Vec<NodeId> = self
                .tree
                .children(root)
                .iter()
                .copied()
                .filter(|id| {
                    self.tree
                        .get(*id)
                        .map_or(false, |node| self.config.share(node.name()).is_none())
                })
                .collect();
            for id in unconfigured {
                info!(share = ?self.tree.path_of(id), "Removing unconfigured share");
                self.remove_with_cache(id);
            }
        }

        let generation = self.generations.next_generation();
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!(dropped, "Replaced pending hash queue");
        }
        self.run = RefreshRun {
            started: Some(Instant::now()),
            ..RefreshRun::default()
        };
        self.state = RefreshState::Scanning;
        if target == RefreshTarget::All {
            self.needs_full_refresh = false;
        }

        let mut targets = Vec::new();
        let mut failures = Vec::new();
        for (scan_target, root_name) in plans {
            match dunce::canonicalize(&scan_target.path) {
                Ok(path) => {
                    let target = ScanTarget {
                        path,
                        ..scan_target
                    };
                    targets.push(target.virtual_path.clone());
                    let job = ScanJob {
                        generation,
                        target,
                        root_name,
                        config: self.config.scan.clone(),
                        token: self.generations.token(generation),
                    };
                    if self.scan_worker.submit(job) {
                        self.run.pending_scans += 1;
                    } else {
                        error!(worker = self.scan_worker.name(), "Scan worker is gone");
                    }
                }
                Err(e) => {
                    warn!(path = %scan_target.path.display(), "Cannot resolve share directory: {}", e);
                    failures.push(Notification::ScanFailed {
                        path: scan_target.virtual_path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(generation, targets = ?targets, "Refresh started");
        self.notify(Notification::RefreshStarted {
            generation,
            targets,
        });
        for failure in failures {
            self.notify(failure);
        }
        self.advance();
        Ok(generation)
    }

    /// Resolve a refresh target into scan targets plus the root name each scan tree gets
    fn plan(&self, target: &RefreshTarget) -> Result<Vec<(ScanTarget, String)>, ApiError> {
        match target {
            RefreshTarget::All => Ok(self
                .config
                .shares
                .iter()
                .map(|share| {
                    (
                        ScanTarget {
                            share: share.name.clone(),
                            virtual_path: format!("/{}", share.name),
                            path: share.path.clone(),
                        },
                        share.name.clone(),
                    )
                })
                .collect()),
            RefreshTarget::Path(virtual_path) => {
                let (share_name, rest) = split_share(virtual_path)
                    .ok_or_else(|| ApiError::PathNotInTree(virtual_path.clone()))?;
                let share = self
                    .config
                    .share(share_name)
                    .ok_or_else(|| ApiError::ShareNotFound(share_name.to_string()))?;

                if !rest.is_empty() {
                    let id = self
                        .tree
                        .find_by_path(virtual_path)
                        .ok_or_else(|| ApiError::PathNotInTree(virtual_path.clone()))?;
                    if !self.tree.get(id).is_some_and(Node::is_dir) {
                        return Err(TreeError::NotADirectory(virtual_path.clone()).into());
                    }
                } else if let Some(id) = self.tree.find_child(self.tree.root(), share_name) {
                    if !self.tree.get(id).is_some_and(Node::is_dir) {
                        return Err(TreeError::NotADirectory(virtual_path.clone()).into());
                    }
                }

                let root_name = rest.last().copied().unwrap_or(share_name).to_string();
                let normalized = normalize_path_string(virtual_path);
                Ok(vec![(
                    ScanTarget {
                        share: share.name.clone(),
                        virtual_path: normalized,
                        path: to_fs_path(&share.path, &rest),
                    },
                    root_name,
                )])
            }
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        let generation = event.generation();
        let current = self.generations.current();
        let stale = !self.generations.is_current(generation);
        match event {
            WorkerEvent::ScanFinished { target, result, .. } => {
                if stale {
                    debug!(generation, current, path = %target.virtual_path, "Discarding stale scan");
                    return;
                }
                self.run.pending_scans = self.run.pending_scans.saturating_sub(1);
                match result {
                    Ok(report) => self.merge_scan(target, report),
                    Err(ScanError::Cancelled) => {}
                    Err(e) => {
                        warn!(path = %target.virtual_path, "Scan failed: {}", e);
                        self.notify(Notification::ScanFailed {
                            path: target.virtual_path,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            WorkerEvent::HashFinished { job, result } => {
                let matches_running = self.in_flight.as_ref().is_some_and(|running| {
                    running.node == job.node && running.generation == job.generation
                });
                if matches_running {
                    self.in_flight = None;
                }
                if stale {
                    debug!(generation, current, path = %job.virtual_path, "Discarding stale hash result");
                } else {
                    self.finish_hash(job, result);
                }
            }
        }
        self.advance();
    }

    fn merge_scan(&mut self, target: ScanTarget, report: ScanReport) {
        self.state = RefreshState::Merging;
        self.publish_status();
        for skipped in &report.skipped {
            debug!(path = %skipped.path.display(), reason = ?skipped.reason, "Skipped during scan");
        }

        let generation = self.generations.current();
        let mut ctx = MergeContext::new(&*self.cache, &mut self.queue, generation);
        let scan = &report.tree;
        let result = match self.tree.find_by_path(&target.virtual_path) {
            Some(live_dir) if self.tree.get(live_dir).is_some_and(Node::is_dir) => {
                merge::merge_directory(
                    &mut self.tree,
                    live_dir,
                    scan,
                    scan.root(),
                    &target.path,
                    &mut ctx,
                )
            }
            Some(_) => Err(TreeError::NotADirectory(target.virtual_path.clone())),
            None if split_share(&target.virtual_path).is_some_and(|(_, rest)| rest.is_empty()) => {
                merge::insert_share(&mut self.tree, scan, &target.path, &mut ctx).map(|_| ())
            }
            None => Err(TreeError::NotFound),
        };
        let stats = ctx.stats;

        match result {
            Ok(()) => {
                if stats.changed() {
                    self.dirty = true;
                }
                info!(
                    path = %target.virtual_path,
                    added = stats.added,
                    removed = stats.removed,
                    requeued = stats.requeued,
                    unchanged = stats.unchanged,
                    queued = self.queue.len(),
                    "Merged scan"
                );
            }
            Err(e) => {
                warn!(path = %target.virtual_path, "Failed to merge scan: {}", e);
                self.notify(Notification::ScanFailed {
                    path: target.virtual_path,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn finish_hash(&mut self, job: HashJob, result: Result<HashOutput, HashError>) {
        match result {
            Ok(output) => self.apply_hash(job, output),
            Err(HashError::Cancelled) => {}
            Err(e) => {
                warn!(path = %job.virtual_path, "Hashing failed: {}", e);
                self.run.failed += 1;
                self.notify(Notification::HashFailed {
                    path: job.virtual_path,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn apply_hash(&mut self, job: HashJob, output: HashOutput) {
        // The node may have been replaced by a merge since the job was queued
        let still_current = self
            .tree
            .get(job.node)
            .is_some_and(|node| node.is_file() && node.size() == job.size);
        if !still_current {
            debug!(path = %job.virtual_path, "File changed since it was queued, dropping hash");
            return;
        }

        if let Err(e) = self.tree.set_hash(job.node, output.tth, output.last_modified) {
            warn!(path = %job.virtual_path, "Failed to record hash: {}", e);
            return;
        }
        let info = HashInfo {
            last_modified: output.last_modified,
            size: output.size,
            block_size: output.block_size,
        };
        if let Err(e) = self.cache.store(&output.tth, &info, &output.blocks) {
            warn!(path = %job.virtual_path, "Failed to store hash: {}", e);
        }
        self.dirty = true;
        self.run.hashed += 1;

        debug!(
            path = %job.virtual_path,
            tth = %output.tth,
            bytes_per_sec = output.bytes_per_sec(),
            "Hashed file"
        );
        self.notify(Notification::HashCompleted {
            path: job.virtual_path,
            size: output.size,
            tth: output.tth,
            elapsed_ms: output.elapsed.as_millis() as u64,
            bytes_per_sec: output.bytes_per_sec(),
        });
    }

    /// Dispatch the next hash job, or finish the refresh once nothing is left
    fn advance(&mut self) {
        while self.in_flight.is_none() {
            let Some(job) = self.queue.pop() else { break };
            let live = self
                .tree
                .get(job.node)
                .is_some_and(|node| node.is_file() && node.size() == job.size);
            if !live {
                continue;
            }
            if self.hash_worker.submit(job.clone()) {
                self.in_flight = Some(job);
            } else {
                error!(worker = self.hash_worker.name(), "Hash worker is gone");
            }
        }

        if self.state != RefreshState::Idle {
            if self.in_flight.is_some() || !self.queue.is_empty() {
                self.state = RefreshState::Hashing;
            } else if self.run.pending_scans > 0 {
                self.state = RefreshState::Scanning;
            } else {
                self.finish_refresh();
            }
        }
        self.publish_status();
    }

    fn finish_refresh(&mut self) {
        self.state = RefreshState::Idle;
        let elapsed_ms = self
            .run
            .started
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0);
        if let Err(e) = self.flush() {
            warn!("Flush after refresh failed: {}", e);
        }
        let generation = self.generations.current();
        info!(
            generation,
            hashed = self.run.hashed,
            failed = self.run.failed,
            elapsed_ms,
            "Refresh finished"
        );
        self.notify(Notification::RefreshFinished {
            generation,
            hashed: self.run.hashed,
            failed: self.run.failed,
            elapsed_ms,
        });
    }

    fn publish_status(&self) {
        let in_flight_bytes = self.in_flight.as_ref().map_or(0, |job| job.size);
        let queued_bytes = self.queue.queued_bytes() + in_flight_bytes;
        let mut status = self.status.write();
        *status = RefreshStatus {
            state: self.state,
            refreshing: self.state != RefreshState::Idle,
            generation: self.generations.current(),
            queued_files: self.queue.len() + usize::from(self.in_flight.is_some()),
            queued_bytes,
            current: self.in_flight.as_ref().map(|job| job.virtual_path.clone()),
            hashed: self.run.hashed,
            failed: self.run.failed,
        };
    }

    /// Save the file list if it changed and sync the hash cache
    pub fn flush(&mut self) -> Result<(), ApiError> {
        if self.dirty {
            filelist::save(&self.tree, &self.file_list_path)?;
            self.dirty = false;
        }
        self.cache.flush()?;
        Ok(())
    }

    /// Handle every completion that has already arrived. Returns how many there were.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Handle completions until the current refresh finishes or `timeout`
    /// passes. Returns true if the coordinator is idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_refreshing() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.handle_event(event),
                Err(_) => return false,
            }
        }
        true
    }

    /// Control loop: handle completions and timers until `shutdown` fires or disconnects.
    ///
    /// Starts with a full refresh when the file list could not be loaded.
    pub fn run(&mut self, shutdown: Receiver<()>) -> Result<(), ApiError> {
        if self.needs_full_refresh || self.tree.is_empty() {
            self.refresh(RefreshTarget::All)?;
        }
        let events = self.events.clone();
        let flush_timer = tick(self.config.flush_interval());
        let refresh_timer = match self.config.auto_refresh_interval() {
            Some(interval) => tick(interval),
            None => never(),
        };

        loop {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => self.handle_event(event),
                    Err(_) => break,
                },
                recv(flush_timer) -> _ => {
                    if let Err(e) = self.flush() {
                        warn!("Periodic flush failed: {}", e);
                    }
                }
                recv(refresh_timer) -> _ => {
                    if !self.is_refreshing() {
                        self.refresh(RefreshTarget::All)?;
                    }
                }
                recv(shutdown) -> _ => break,
            }
        }
        info!("Control loop stopping");
        self.flush()
    }

    pub fn is_refreshing(&self) -> bool {
        self.state != RefreshState::Idle
    }

    pub fn status(&self) -> RefreshStatus {
        self.status.read().clone()
    }

    /// Shared status handle, readable from any thread
    pub fn status_handle(&self) -> Arc<RwLock<RefreshStatus>> {
        Arc::clone(&self.status)
    }

    /// The live tree, for read-only lookups
    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.tree.get(id)
    }

    pub fn lookup_path(&self, virtual_path: &str) -> Option<NodeId> {
        self.tree.find_by_path(virtual_path)
    }

    pub fn lookup_tth(&self, tth: &Tth) -> &[NodeId] {
        self.tree.find_by_tth(tth)
    }

    /// Root directory node of a share
    pub fn share_root(&self, name: &str) -> Option<NodeId> {
        self.tree.find_child(self.tree.root(), name)
    }

    /// Filesystem location of a node, from the share's configured path
    pub fn real_path(&self, id: NodeId) -> Option<PathBuf> {
        let virtual_path = self.tree.path_of(id)?;
        let (share_name, rest) = split_share(&virtual_path)?;
        let share: &ShareConfig = self.config.share(share_name)?;
        Some(to_fs_path(&share.path, &rest))
    }

    /// Per-block hashes for a hashed file
    pub fn hash_tree(&self, tth: &Tth) -> Result<Option<Vec<Tth>>, ApiError> {
        Ok(self.cache.get_blocks(tth)?)
    }

    /// Number of files in the hash cache
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn file_list_path(&self) -> &Path {
        &self.file_list_path
    }
}

impl Drop for RefreshCoordinator {
    fn drop(&mut self) {
        // Make in-flight jobs give up so the worker joins are quick
        self.generations.next_generation();
    }
}
