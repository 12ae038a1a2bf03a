//! Refresh progress presentation: one line per notification plus a summary.

use super::shared::format_bytes;
use super::status::IndexStatus;
use crate::refresh::Notification;
use owo_colors::OwoColorize;

pub fn format_notification_text(notification: &Notification) -> String {
    match notification {
        Notification::RefreshStarted { generation, targets } => {
            format!("Refresh #{} started: {}", generation, targets.join(", "))
        }
        Notification::ScanFailed { path, reason } => {
            format!("{} {}: {}", "scan failed".red(), path, reason)
        }
        Notification::HashCompleted {
            path,
            size,
            tth,
            bytes_per_sec,
            ..
        } => format!(
            "{} {} ({}, {}/s) {}",
            "hashed".green(),
            path,
            format_bytes(*size),
            format_bytes(*bytes_per_sec),
            tth
        ),
        Notification::HashFailed { path, reason } => {
            format!("{} {}: {}", "hash failed".yellow(), path, reason)
        }
        Notification::RefreshFinished {
            generation,
            hashed,
            failed,
            elapsed_ms,
        } => format!(
            "Refresh #{} finished in {:.1}s: {} hashed, {} failed",
            generation,
            *elapsed_ms as f64 / 1000.0,
            hashed,
            failed
        ),
    }
}

pub fn format_refresh_summary(status: &IndexStatus) -> String {
    let files: usize = status.shares.iter().map(|s| s.files).sum();
    let hashed: usize = status.shares.iter().map(|s| s.hashed).sum();
    let size: u64 = status.shares.iter().map(|s| s.size).sum();
    let mut out = format!(
        "Indexed {} files ({}) in {} shares, {} hashed",
        files,
        format_bytes(size),
        status.shares.len(),
        hashed
    );
    if hashed < files {
        out.push_str(&format!("; {} still unhashed", files - hashed));
    }
    out.push_str(&format!("\nSaved {}", status.file_list.display()));
    out
}
