//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, StorageError};

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::ConfigError(msg) => format!("Configuration error: {}\nSee `shareindex config`.", msg),
        ApiError::StorageError(inner @ StorageError::Database(_)) => format!(
            "{}\nThe hash cache may be in use by another shareindex process.",
            inner
        ),
        other => other.to_string(),
    }
}
