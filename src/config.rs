//! Configuration System
//!
//! Layered configuration for the indexer: built-in defaults, the global
//! config file, an explicit `--config` file and `SHAREINDEX__*` environment
//! variables, in increasing order of priority. The share list is the
//! ordered name → path mapping every refresh starts from.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::tree::node::is_valid_name;
use crate::tree::walker::WalkerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Scan options share the walker's configuration shape
pub type ScanConfig = WalkerConfig;

/// A named top-level shared directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareConfig {
    pub name: String,
    pub path: PathBuf,
}

/// Where the file list and hash cache live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for relative storage paths
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Serialized share tree; the extension picks the compression
    #[serde(default = "default_file_list")]
    pub file_list: PathBuf,

    /// Hash cache database directory
    #[serde(default = "default_hash_cache")]
    pub hash_cache: PathBuf,
}

pub(crate) fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "shareindex")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".shareindex"))
}

fn default_file_list() -> PathBuf {
    PathBuf::from("files.xml.bz2")
}

fn default_hash_cache() -> PathBuf {
    PathBuf::from("hashdata.sled")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_list: default_file_list(),
            hash_cache: default_hash_cache(),
        }
    }
}

impl StorageConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn file_list_path(&self) -> PathBuf {
        self.resolve(&self.file_list)
    }

    pub fn hash_cache_path(&self) -> PathBuf {
        self.resolve(&self.hash_cache)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Shared directories, in display order
    #[serde(default)]
    pub shares: Vec<ShareConfig>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    /// Seconds between periodic hash cache syncs and file list saves
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// Refresh every share on this interval while the control loop runs
    #[serde(default)]
    pub auto_refresh_secs: Option<u64>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_flush_interval() -> u64 {
    60
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            shares: Vec::new(),
            storage: StorageConfig::default(),
            scan: ScanConfig::default(),
            flush_interval_secs: default_flush_interval(),
            auto_refresh_secs: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Share(String, String),
    Storage(String),
    Timer(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Share(name, msg) => write!(f, "Share '{}': {}", name, msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Timer(msg) => write!(f, "Timers: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl IndexerConfig {
    /// Look up a share by name
    pub fn share(&self, name: &str) -> Option<&ShareConfig> {
        self.shares.iter().find(|share| share.name == name)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn auto_refresh_interval(&self) -> Option<Duration> {
        self.auto_refresh_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let mut names = HashSet::new();
        for share in &self.shares {
            if !is_valid_name(&share.name) {
                errors.push(ValidationError::Share(
                    share.name.clone(),
                    "name must be non-empty, not '.' or '..', and contain no '/'".to_string(),
                ));
            }
            if !names.insert(share.name.as_str()) {
                errors.push(ValidationError::Share(
                    share.name.clone(),
                    "duplicate share name".to_string(),
                ));
            }
            if !share.path.is_absolute() {
                errors.push(ValidationError::Share(
                    share.name.clone(),
                    format!("path {} is not absolute", share.path.display()),
                ));
            }
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "data_dir cannot be empty".to_string(),
            ));
        }
        if self.storage.file_list.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "file_list cannot be empty".to_string(),
            ));
        }
        if self.storage.hash_cache.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "hash_cache cannot be empty".to_string(),
            ));
        }

        if self.flush_interval_secs == 0 {
            errors.push(ValidationError::Timer(
                "flush_interval_secs must be greater than 0".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all problems into one error
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}
