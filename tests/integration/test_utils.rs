//! Shared test utilities for integration tests
//!
//! Builds throwaway share directories and configurations, and serializes
//! access to process environment variables.

use shareindex::config::{IndexerConfig, ShareConfig, StorageConfig};
use shareindex::refresh::Notification;
use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Upper bound for a refresh of a handful of small files
pub const WAIT: Duration = Duration::from_secs(30);

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Environment variable state to restore after test
struct EnvState {
    vars: Vec<(&'static str, Option<String>)>,
}

impl EnvState {
    fn capture(names: &[&'static str]) -> Self {
        Self {
            vars: names
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        }
    }

    fn restore(self) {
        for (name, value) in self.vars {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME pointing into `test_dir`
///
/// Uses a global mutex so parallel tests never see each other's variables,
/// and restores the original values afterwards.
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture(&["HOME", "XDG_CONFIG_HOME"]);

    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_home).unwrap();
    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path());

    let result = f();

    env_state.restore();
    result
}

/// Take the environment lock without changing anything
pub fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
}

/// Configuration with plain-XML storage under `data` and the given shares
pub fn test_config(data: &Path, shares: &[(&str, &Path)]) -> IndexerConfig {
    IndexerConfig {
        shares: shares
            .iter()
            .map(|(name, path)| ShareConfig {
                name: name.to_string(),
                path: path.to_path_buf(),
            })
            .collect(),
        storage: StorageConfig {
            data_dir: data.to_path_buf(),
            file_list: PathBuf::from("files.xml"),
            hash_cache: PathBuf::from("hashdata.sled"),
        },
        ..IndexerConfig::default()
    }
}

/// Write `contents` to `root/relative`, creating parent directories
pub fn write_file(root: &Path, relative: &str, contents: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

/// Everything delivered so far
pub fn drain(notifications: &Receiver<Notification>) -> Vec<Notification> {
    notifications.try_iter().collect()
}

pub fn hashed_paths(notifications: &[Notification]) -> Vec<String> {
    let mut paths: Vec<String> = notifications
        .iter()
        .filter_map(|n| match n {
            Notification::HashCompleted { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect();
    paths.sort();
    paths
}

pub fn failed_paths(notifications: &[Notification]) -> Vec<String> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::HashFailed { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect()
}

/// Generations of every RefreshFinished notification
pub fn finished_generations(notifications: &[Notification]) -> Vec<u64> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::RefreshFinished { generation, .. } => Some(*generation),
            _ => None,
        })
        .collect()
}
