//! Integration tests for the layered configuration

use crate::integration::test_utils::{env_lock, with_xdg_env};
use shareindex::config::{ConfigLoader, IndexerConfig};
use shareindex::error::ApiError;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_global(test_dir: &TempDir, contents: &str) {
    let dir = test_dir.path().join("shareindex");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), contents).unwrap();
}

#[test]
fn test_global_file_is_loaded() {
    let test_dir = TempDir::new().unwrap();
    write_global(
        &test_dir,
        r#"
flush_interval_secs = 30

[[shares]]
name = "video"
path = "/srv/video"
"#,
    );

    let config = with_xdg_env(&test_dir, || ConfigLoader::load(None)).unwrap();
    assert_eq!(config.flush_interval_secs, 30);
    assert_eq!(config.shares.len(), 1);
    assert_eq!(config.shares[0].path, PathBuf::from("/srv/video"));
}

#[test]
fn test_explicit_file_overrides_global() {
    let test_dir = TempDir::new().unwrap();
    write_global(
        &test_dir,
        "flush_interval_secs = 30\nauto_refresh_secs = 900\n",
    );
    let explicit = test_dir.path().join("local.toml");
    std::fs::write(&explicit, "flush_interval_secs = 10\n").unwrap();

    let config = with_xdg_env(&test_dir, || ConfigLoader::load(Some(&explicit))).unwrap();
    assert_eq!(config.flush_interval_secs, 10);
    // Keys the explicit file leaves alone still come from the global file
    assert_eq!(config.auto_refresh_secs, Some(900));
}

#[test]
fn test_defaults_without_any_file() {
    let test_dir = TempDir::new().unwrap();
    let config = with_xdg_env(&test_dir, || ConfigLoader::load(None)).unwrap();
    let defaults = IndexerConfig::default();
    assert_eq!(config.flush_interval_secs, defaults.flush_interval_secs);
    assert_eq!(config.storage.file_list, defaults.storage.file_list);
    assert!(config.shares.is_empty());
}

#[test]
fn test_invalid_shares_fail_validation() {
    let _guard = env_lock();
    let test_dir = TempDir::new().unwrap();
    let file = test_dir.path().join("bad.toml");
    std::fs::write(
        &file,
        r#"
[[shares]]
name = ".."
path = "relative"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&file).unwrap();
    match config.validated() {
        Err(ApiError::ConfigError(msg)) => {
            assert!(msg.contains("Share '..'"));
            assert!(msg.contains("not absolute"));
        }
        other => panic!("expected validation failure, got {:?}", other.is_ok()),
    }
}

#[test]
fn test_malformed_file_is_an_error() {
    let _guard = env_lock();
    let test_dir = TempDir::new().unwrap();
    let file = test_dir.path().join("broken.toml");
    std::fs::write(&file, "flush_interval_secs = \"soon\"\n").unwrap();
    assert!(ConfigLoader::load_from_file(&file).is_err());
}
