//! Environment variable source: SHAREINDEX__* prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Add environment variable overlay to builder.
/// `SHAREINDEX__STORAGE__DATA_DIR` sets `storage.data_dir`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix("SHAREINDEX")
            .separator("__")
            .try_parsing(true),
    );
    Ok(builder)
}
