//! CLI parse: clap types for shareindex. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// shareindex CLI - Share indexing and Tiger Tree hashing
#[derive(Parser)]
#[command(name = "shareindex")]
#[command(version)]
#[command(about = "Index shared directories and hash their files with Tiger Tree Hash")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Rescan shares, hash new and changed files, and save the file list
    Refresh {
        /// Share or directory to refresh (e.g. /music/albums); all shares if omitted
        path: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show per-share totals and hashing progress
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List a directory of the share index
    Ls {
        /// Virtual path to list (default: the share list)
        path: Option<String>,
    },
    /// Find every shared file with the given TTH
    FindTth {
        /// Base32 root hash (39 characters)
        tth: String,
    },
    /// Run the control loop until stdin closes
    Run,
    /// Print the effective configuration as TOML
    Config,
}
