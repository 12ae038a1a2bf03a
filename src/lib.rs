//! shareindex: Share Indexing and Tiger Tree Hashing
//!
//! Keeps an in-memory tree of shared directories in sync with the
//! filesystem, hashes every shared file with Tiger Tree Hash on a background
//! worker, caches the hashes in a sled database and persists the tree as an
//! XML file list, so a restart only rehashes what changed.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod filelist;
pub mod hasher;
pub mod logging;
pub mod refresh;
pub mod store;
pub mod tree;
pub mod tth;
pub mod types;
