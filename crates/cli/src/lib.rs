//! `seatwatch` command: configuration and pipeline orchestration.

pub mod config;
pub mod pipeline;

pub use config::{AppConfig, Cli};
pub use pipeline::{run, RunSettings, RunSummary};
