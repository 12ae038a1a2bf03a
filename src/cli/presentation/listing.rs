//! Directory listing and hash lookup presentation.

use super::shared::{format_bytes, format_mtime};
use crate::tree::{FileTree, NodeId};
use crate::types::Tth;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub tth: Option<Tth>,
    pub last_modified: Option<u64>,
    pub complete: bool,
}

impl ListingEntry {
    pub fn children_of(tree: &FileTree, dir: NodeId) -> Vec<ListingEntry> {
        tree.children(dir)
            .iter()
            .filter_map(|id| tree.get(*id))
            .map(|node| ListingEntry {
                name: node.name().to_string(),
                is_dir: node.is_dir(),
                size: node.size(),
                tth: node.tth(),
                last_modified: node.last_modified(),
                complete: node.is_complete(),
            })
            .collect()
    }
}

pub fn format_listing_text(path: &str, entries: &[ListingEntry]) -> String {
    if entries.is_empty() {
        return format!("{} is empty.", path);
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Name", "Size", "TTH", "Modified"]);
    for entry in entries {
        let (name, tth) = if entry.is_dir {
            let marker = if entry.complete { "" } else { " (hashing)" };
            (format!("{}/{}", entry.name.blue(), marker), String::new())
        } else {
            let tth = entry
                .tth
                .map(|t| t.to_base32())
                .unwrap_or_else(|| "-".to_string());
            (entry.name.clone(), tth)
        };
        table.add_row(vec![
            name,
            format_bytes(entry.size),
            tth,
            entry
                .last_modified
                .map(format_mtime)
                .unwrap_or_default(),
        ]);
    }
    format!("{}\n{}", path, table)
}

pub fn format_find_tth_text(tth: &Tth, paths: &[String]) -> String {
    if paths.is_empty() {
        return format!("No shared file has TTH {}", tth);
    }
    paths.join("\n")
}
