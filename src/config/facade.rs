//! ConfigLoader facade delegating to the merge service.

use super::merge::service::MergeService;
use super::IndexerConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from defaults, the global file, an optional
    /// explicit file and the environment.
    pub fn load(explicit: Option<&Path>) -> Result<IndexerConfig, ConfigError> {
        MergeService::load(explicit)
    }

    /// Load configuration from a specific file (plus defaults and environment).
    pub fn load_from_file(path: &Path) -> Result<IndexerConfig, ConfigError> {
        MergeService::load_from_file(path)
    }
}
