//! CLI presentation: text and json formatters per command family.

mod listing;
mod refresh;
mod shared;
mod status;

pub use listing::{format_find_tth_text, format_listing_text, ListingEntry};
pub use refresh::{format_notification_text, format_refresh_summary};
pub use shared::to_pretty_json;
pub use status::{
    build_index_status, format_index_status_json, format_index_status_text, IndexStatus,
    ShareSummary,
};
