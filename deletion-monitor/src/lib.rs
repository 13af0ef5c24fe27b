/*!
Directory deletion monitor

Watches a directory for deletions, attributes each one to a user, and
forwards an alert to a webhook, optionally recording it in SQLite. A small
HTTP service serves the recorded log and fans log queries out across sites.
*/

pub mod core;
pub mod fanout;
pub mod server;

pub use crate::core::{
    config::MonitorConfig,
    error::{MonitorError, Result},
    event::DeletionEvent,
    tracker::DeletionTracker,
};
