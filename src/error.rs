//! Error types for the share index.

use std::path::PathBuf;
use thiserror::Error;

/// Hash cache and persistence errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Hash cache database error: {0}")]
    Database(String),

    #[error("Corrupt hash cache record: {0}")]
    Corrupt(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// Tree model errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Node not found")]
    NotFound,

    #[error("Name already exists in directory: {0}")]
    DuplicateName(String),

    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("The root directory cannot be removed")]
    RootRemoval,
}

/// File list grammar violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("unexpected element <{0}>")]
    UnexpectedElement(String),

    #[error("unexpected attribute {attribute} on <{element}>")]
    UnexpectedAttribute { element: String, attribute: String },

    #[error("missing attribute {attribute} on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("unexpected text content")]
    UnexpectedText,

    #[error("unsupported file list version {0:?}")]
    Version(String),

    #[error("invalid Size {0:?}")]
    InvalidSize(String),

    #[error("invalid TTH {0:?}")]
    InvalidTth(String),

    #[error("invalid Incomplete flag {0:?}")]
    InvalidFlag(String),

    #[error("invalid name {0:?}")]
    InvalidName(String),

    #[error("duplicate name {0:?}")]
    DuplicateName(String),

    #[error("document ended before </FileListing>")]
    Truncated,
}

/// File list load/save errors
#[derive(Debug, Error)]
pub enum FileListError {
    #[error("File list I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File list parse error at byte {position}: {source}")]
    Format {
        position: usize,
        #[source]
        source: FormatError,
    },
}

/// Directory scan errors
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Share root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to read share root {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scan superseded by a newer refresh")]
    Cancelled,
}

/// Hash job failures
#[derive(Debug, Error)]
pub enum HashError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File grew while hashing: read {read} bytes, expected {expected}")]
    Grew { expected: u64, read: u64 },

    #[error("File size changed while hashing: read {read} bytes, expected {expected}")]
    SizeMismatch { expected: u64, read: u64 },

    #[error("Hash job superseded by a newer refresh")]
    Cancelled,
}

/// Top-level errors returned by the coordinator and CLI
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("File list error: {0}")]
    FileList(#[from] FileListError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No share named {0:?} is configured")]
    ShareNotFound(String),

    #[error("Path not found in share index: {0}. Run `shareindex refresh` to rescan.")]
    PathNotInTree(String),

    #[error("Failed to start worker thread: {0}")]
    Worker(std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to write output: {0}")]
    Output(std::io::Error),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
