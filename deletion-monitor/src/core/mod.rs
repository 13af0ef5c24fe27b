/*!
Core deletion pipeline: sources, parsing, dedup, attribution and outputs
*/

pub mod command;
pub mod config;
pub mod dedup;
pub mod error;
pub mod event;
pub mod log_source;
pub mod output_plugins;
pub mod parser;
pub mod store;
pub mod tracker;
pub mod user_resolver;
