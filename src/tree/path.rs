//! Virtual path handling
//!
//! Virtual paths are slash-separated and rooted at the share list root:
//! `/<share>/<dir>/.../<name>`. Empty components (repeated or trailing
//! slashes) are ignored.

use std::path::{Path, PathBuf};

/// Iterate the non-empty components of a virtual path
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Normalize a virtual path: leading slash, no empty components, no trailing slash
pub fn normalize_path_string(path: &str) -> String {
    let mut result = String::with_capacity(path.len() + 1);
    for component in components(path) {
        result.push('/');
        result.push_str(component);
    }
    if result.is_empty() {
        result.push('/');
    }
    result
}

/// Split a virtual path into its share name and the remaining components
pub fn split_share(path: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = components(path);
    let share = parts.next()?;
    Some((share, parts.collect()))
}

/// Map the components below a share onto the share's filesystem path
pub fn to_fs_path(share_root: &Path, rest: &[&str]) -> PathBuf {
    let mut out = share_root.to_path_buf();
    for component in rest {
        out.push(component);
    }
    out
}
