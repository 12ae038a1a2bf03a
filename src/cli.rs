//! CLI domain: parse, route, help, output, and presentation only.
//! No indexing logic; the route table dispatches to the refresh coordinator.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    build_index_status, format_index_status_json, format_index_status_text, IndexStatus,
    ShareSummary,
};
pub use route::RunContext;
