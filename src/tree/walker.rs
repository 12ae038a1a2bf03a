//! Filesystem walker that builds an unhashed share tree

use crate::cancel::CancellationToken;
use crate::error::ScanError;
use crate::hasher::mtime_secs;
use crate::tree::{FileTree, Node, NodeId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

/// Filesystem walker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkerConfig {
    /// Whether to follow symbolic links (default: true)
    #[serde(default = "default_true")]
    pub follow_symlinks: bool,
    /// Share entries whose name starts with a dot
    #[serde(default)]
    pub share_hidden: bool,
    /// Name patterns to exclude; `*` matches any run of characters
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: true,
            share_hidden: false,
            exclude: Vec::new(),
        }
    }
}

/// Why an entry was left out of the scan tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Name is not valid UTF-8
    NonUtf8Name,
    /// Neither a regular file nor a directory
    Special,
    Hidden,
    Excluded,
    /// Metadata or directory listing failed (includes symlink loops)
    Unreadable(String),
}

#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Scan result: the fresh tree plus everything that was skipped
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub tree: FileTree,
    pub skipped: Vec<SkippedEntry>,
    pub files: usize,
    pub directories: usize,
}

/// Filesystem walker
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
}

impl Walker {
    /// Create a new walker for the given root path
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            config: WalkerConfig::default(),
        }
    }

    /// Create a walker with custom configuration
    pub fn with_config(root: PathBuf, config: WalkerConfig) -> Self {
        Self { root, config }
    }

    /// Walk the filesystem and build a tree rooted at the walker's root.
    ///
    /// The root node takes `root_name`; every entry below it is unhashed.
    /// Per-entry problems are collected in the report, only a missing or
    /// unreadable root fails the scan.
    #[instrument(skip(self, token), fields(root = %self.root.display()))]
    pub fn scan(&self, root_name: &str, token: &CancellationToken) -> Result<ScanReport, ScanError> {
        let start = Instant::now();
        let root_meta = std::fs::metadata(&self.root).map_err(|source| ScanError::Root {
            path: self.root.clone(),
            source,
        })?;
        if !root_meta.is_dir() {
            return Err(ScanError::NotADirectory(self.root.clone()));
        }

        let mut report = ScanReport {
            tree: FileTree::with_root_name(root_name),
            skipped: Vec::new(),
            files: 0,
            directories: 0,
        };
        // dirs[d] is the node for the directory currently open at depth d
        let mut dirs: Vec<NodeId> = vec![report.tree.root()];

        let mut entries = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();

        let mut visited = 0usize;
        while let Some(entry) = entries.next() {
            visited += 1;
            if token.is_cancelled_sparse(visited) {
                return Err(ScanError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!(path = %path.display(), "Skipping unreadable entry: {}", e);
                    report.skipped.push(SkippedEntry {
                        path,
                        reason: SkipReason::Unreadable(e.to_string()),
                    });
                    continue;
                }
            };

            let depth = entry.depth();
            let is_dir = entry.file_type().is_dir();
            if let Some(reason) = self.skip_reason(&entry) {
                debug!(path = %entry.path().display(), ?reason, "Skipping entry");
                report.skipped.push(SkippedEntry {
                    path: entry.path().to_path_buf(),
                    reason,
                });
                if is_dir {
                    entries.skip_current_dir();
                }
                continue;
            }

            dirs.truncate(depth);
            let Some(&parent) = dirs.last() else {
                continue;
            };
            // Checked by skip_reason above
            let name = entry.file_name().to_string_lossy().into_owned();

            if is_dir {
                match report.tree.insert(parent, Node::directory(name)) {
                    Ok(id) => {
                        dirs.push(id);
                        report.directories += 1;
                    }
                    Err(e) => {
                        warn!(path = %entry.path().display(), "Skipping directory: {}", e);
                        entries.skip_current_dir();
                    }
                }
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %entry.path().display(), "Skipping file without metadata: {}", e);
                    report.skipped.push(SkippedEntry {
                        path: entry.path().to_path_buf(),
                        reason: SkipReason::Unreadable(e.to_string()),
                    });
                    continue;
                }
            };
            let node = Node::file(name, metadata.len(), mtime_secs(&metadata));
            match report.tree.insert(parent, node) {
                Ok(_) => report.files += 1,
                Err(e) => warn!(path = %entry.path().display(), "Skipping file: {}", e),
            }
        }

        info!(
            files = report.files,
            directories = report.directories,
            skipped = report.skipped.len(),
            bytes = report.tree.root_node().size(),
            duration_ms = start.elapsed().as_millis(),
            "Scan completed"
        );
        Ok(report)
    }

    fn skip_reason(&self, entry: &DirEntry) -> Option<SkipReason> {
        let Some(name) = entry.file_name().to_str() else {
            return Some(SkipReason::NonUtf8Name);
        };
        let file_type = entry.file_type();
        if !file_type.is_file() && !file_type.is_dir() {
            return Some(SkipReason::Special);
        }
        if !self.config.share_hidden && name.starts_with('.') {
            return Some(SkipReason::Hidden);
        }
        if self
            .config
            .exclude
            .iter()
            .any(|pattern| wildcard_match(pattern, name))
        {
            return Some(SkipReason::Excluded);
        }
        None
    }
}

/// Match `name` against a pattern where `*` matches any run of characters
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while n < name.len() {
        if p < pattern.len() && pattern[p] != '*' && pattern[p] == name[n] {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((star_p, star_n)) = star {
            p = star_p + 1;
            n = star_n + 1;
            star = Some((star_p, star_n + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
