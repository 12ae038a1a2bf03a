//! Merge rules: defaults, override order, conflict handling.

use crate::config::default_data_dir;
use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default(
            "storage.data_dir",
            default_data_dir().to_string_lossy().into_owned(),
        )?
        .set_default("storage.file_list", "files.xml.bz2")?
        .set_default("storage.hash_cache", "hashdata.sled")?
        .set_default("flush_interval_secs", 60)
}
