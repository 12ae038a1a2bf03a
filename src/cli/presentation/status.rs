//! Status presentation: per-share totals, cache size and refresh progress.

use super::shared::{format_bytes, format_section_heading, to_pretty_json};
use crate::error::ApiError;
use crate::refresh::{RefreshCoordinator, RefreshStatus};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde::Serialize;
use std::path::PathBuf;

/// One row of the share table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareSummary {
    pub name: String,
    pub path: PathBuf,
    /// False for configured shares that have never been scanned
    pub indexed: bool,
    pub size: u64,
    pub files: usize,
    pub hashed: usize,
}

impl ShareSummary {
    pub fn is_complete(&self) -> bool {
        self.indexed && self.hashed == self.files
    }
}

/// Everything `shareindex status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub shares: Vec<ShareSummary>,
    pub file_list: PathBuf,
    pub cache_entries: usize,
    pub needs_full_refresh: bool,
    pub refresh: RefreshStatus,
}

pub fn build_index_status(coordinator: &RefreshCoordinator) -> IndexStatus {
    let tree = coordinator.tree();
    let shares = coordinator
        .config()
        .shares
        .iter()
        .map(|share| {
            let root = coordinator.share_root(&share.name);
            let (size, files, hashed) = match root.and_then(|id| Some((id, tree.get(id)?))) {
                Some((id, node)) => {
                    let files = tree.files_under(id);
                    let hashed = files
                        .iter()
                        .filter(|f| tree.get(**f).is_some_and(|n| n.tth().is_some()))
                        .count();
                    (node.size(), files.len(), hashed)
                }
                None => (0, 0, 0),
            };
            ShareSummary {
                name: share.name.clone(),
                path: share.path.clone(),
                indexed: root.is_some(),
                size,
                files,
                hashed,
            }
        })
        .collect();

    IndexStatus {
        shares,
        file_list: coordinator.file_list_path().to_path_buf(),
        cache_entries: coordinator.cache_len(),
        needs_full_refresh: coordinator.needs_full_refresh(),
        refresh: coordinator.status(),
    }
}

pub fn format_index_status_text(status: &IndexStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Shares")));
    if status.shares.is_empty() {
        out.push_str("  No shares configured. Add [[shares]] entries to the config file.\n\n");
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Share", "Path", "Size", "Files", "Hashed", "Complete"]);
        for share in &status.shares {
            let complete = match (share.indexed, share.is_complete()) {
                (false, _) => "not scanned",
                (true, true) => "yes",
                (true, false) => "no",
            };
            table.add_row(vec![
                share.name.clone(),
                share.path.display().to_string(),
                format_bytes(share.size),
                share.files.to_string(),
                share.hashed.to_string(),
                complete.to_string(),
            ]);
        }
        out.push_str(&format!("{}\n\n", table));
    }

    out.push_str(&format!("{}\n", format_section_heading("Index")));
    out.push_str(&format!("  File list: {}\n", status.file_list.display()));
    out.push_str(&format!("  Hash cache entries: {}\n", status.cache_entries));
    if status.needs_full_refresh {
        out.push_str("  File list missing or unreadable; run `shareindex refresh`.\n");
    }
    if status.refresh.refreshing {
        out.push_str(&format!(
            "  Refreshing: {} files ({}) queued\n",
            status.refresh.queued_files,
            format_bytes(status.refresh.queued_bytes)
        ));
    }
    out
}

pub fn format_index_status_json(status: &IndexStatus) -> Result<String, ApiError> {
    to_pretty_json(status)
}
