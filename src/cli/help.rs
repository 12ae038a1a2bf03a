//! CLI help and command-name contract for logging spans and routing.

use crate::cli::parse::Commands;

/// Command name string used in log spans (e.g. "refresh", "find_tth").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Refresh { .. } => "refresh",
        Commands::Status { .. } => "status",
        Commands::Ls { .. } => "ls",
        Commands::FindTth { .. } => "find_tth",
        Commands::Run => "run",
        Commands::Config => "config",
    }
}

/// Whether a command rescans and hashes, as opposed to reading the saved index
pub fn is_mutating(command: &Commands) -> bool {
    matches!(command, Commands::Refresh { .. } | Commands::Run)
}
