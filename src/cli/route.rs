//! CLI route: single route table and run context. Dispatches to the refresh
//! coordinator and presentation.

use crate::config::{ConfigLoader, IndexerConfig};
use crate::error::{ApiError, TreeError};
use crate::refresh::{Notification, RefreshCoordinator, RefreshTarget};
use crate::types::Tth;
use crossbeam_channel::{bounded, Receiver};
use serde_json::json;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, info_span, warn};

use crate::cli::help::{command_name, is_mutating};
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    build_index_status, format_find_tth_text, format_index_status_json,
    format_index_status_text, format_listing_text, format_notification_text,
    format_refresh_summary, to_pretty_json, ListingEntry,
};

/// How often `refresh` wakes up to print progress while hashing
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Runtime context for CLI execution: the loaded configuration and where it came from.
/// Built from an optional config path using ConfigLoader only.
pub struct RunContext {
    config: IndexerConfig,
    config_path: Option<PathBuf>,
}

impl RunContext {
    /// Load and validate the layered configuration.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(config_path.as_deref())?.validated()?;
        Ok(Self::with_config(config, config_path))
    }

    /// Use an already loaded configuration.
    pub fn with_config(config: IndexerConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Run a command and return what should be printed to stdout.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let name = command_name(command);
        let span = info_span!("command", command = name);
        let _guard = span.enter();
        info!(mutating = is_mutating(command), "Executing command");

        match command {
            Commands::Refresh { path, format } => self.handle_refresh(path.as_deref(), format),
            Commands::Status { format } => self.handle_status(format),
            Commands::Ls { path } => self.handle_ls(path.as_deref().unwrap_or("/")),
            Commands::FindTth { tth } => self.handle_find_tth(tth),
            Commands::Run => self.handle_run(),
            Commands::Config => self.config.to_toml(),
        }
    }

    fn open(&self) -> Result<RefreshCoordinator, ApiError> {
        RefreshCoordinator::open(self.config.clone())
    }

    fn handle_refresh(&self, path: Option<&str>, format: &str) -> Result<String, ApiError> {
        let json_output = format == "json";
        let mut coordinator = self.open()?;
        let notifications = coordinator.subscribe();
        let target = match path {
            Some(path) => RefreshTarget::Path(path.to_string()),
            None => RefreshTarget::All,
        };

        coordinator.refresh(target)?;
        let mut collected = Vec::new();
        loop {
            let idle = coordinator.wait_idle(PROGRESS_INTERVAL);
            drain_notifications(&notifications, json_output, &mut collected)?;
            if idle {
                break;
            }
        }
        coordinator.flush()?;

        let status = build_index_status(&coordinator);
        if json_output {
            to_pretty_json(&json!({
                "notifications": collected,
                "status": status,
            }))
        } else {
            Ok(format_refresh_summary(&status))
        }
    }

    fn handle_status(&self, format: &str) -> Result<String, ApiError> {
        let coordinator = self.open()?;
        let status = build_index_status(&coordinator);
        match format {
            "json" => format_index_status_json(&status),
            _ => Ok(format_index_status_text(&status)),
        }
    }

    fn handle_ls(&self, path: &str) -> Result<String, ApiError> {
        let coordinator = self.open()?;
        let id = coordinator
            .lookup_path(path)
            .ok_or_else(|| ApiError::PathNotInTree(path.to_string()))?;
        let node = coordinator
            .node(id)
            .ok_or_else(|| ApiError::PathNotInTree(path.to_string()))?;
        if !node.is_dir() {
            return Err(TreeError::NotADirectory(path.to_string()).into());
        }
        let entries = ListingEntry::children_of(coordinator.tree(), id);
        Ok(format_listing_text(path, &entries))
    }

    fn handle_find_tth(&self, text: &str) -> Result<String, ApiError> {
        let tth = Tth::from_base32(text.trim())
            .map_err(|e| ApiError::InvalidArgument(format!("TTH {:?}: {}", text, e)))?;
        let coordinator = self.open()?;
        let mut paths: Vec<String> = coordinator
            .lookup_tth(&tth)
            .iter()
            .filter_map(|id| coordinator.tree().path_of(*id))
            .collect();
        paths.sort();
        Ok(format_find_tth_text(&tth, &paths))
    }

    fn handle_run(&self) -> Result<String, ApiError> {
        let mut coordinator = self.open()?;
        let notifications = coordinator.subscribe();
        run_with_printer(coordinator, notifications, stdin_shutdown()?, |notification| {
            println!("{}", format_notification_text(notification))
        })?;
        Ok("Stopped".to_string())
    }
}

/// Run the control loop while a printer thread reports notifications.
/// Returns only after every notification has been handed to `print`.
fn run_with_printer<F>(
    mut coordinator: RefreshCoordinator,
    notifications: Receiver<Notification>,
    shutdown: Receiver<()>,
    mut print: F,
) -> Result<(), ApiError>
where
    F: FnMut(&Notification) + Send + 'static,
{
    let printer = std::thread::Builder::new()
        .name("progress-printer".to_string())
        .spawn(move || {
            for notification in notifications {
                print(&notification);
            }
        })
        .map_err(ApiError::Worker)?;

    let result = coordinator.run(shutdown);
    // Dropping the coordinator closes the channel so the printer drains and exits
    drop(coordinator);
    if printer.join().is_err() {
        warn!("Progress printer panicked");
    }
    result
}

/// Fires when stdin reaches end of file
fn stdin_shutdown() -> Result<Receiver<()>, ApiError> {
    let (tx, rx) = bounded(1);
    std::thread::Builder::new()
        .name("stdin-watch".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            while matches!(stdin.lock().read_line(&mut line), Ok(n) if n > 0) {
                line.clear();
            }
            debug!("stdin closed, stopping");
            let _ = tx.send(());
        })
        .map_err(ApiError::Worker)?;
    Ok(rx)
}

/// Print text notifications as they arrive; keep JSON ones for the final document
fn drain_notifications(
    notifications: &Receiver<Notification>,
    json_output: bool,
    collected: &mut Vec<Notification>,
) -> Result<(), ApiError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for notification in notifications.try_iter() {
        if json_output {
            collected.push(notification);
        } else {
            writeln!(out, "{}", format_notification_text(&notification))
                .map_err(ApiError::Output)?;
        }
    }
    Ok(())
}
