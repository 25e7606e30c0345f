//! Command line interface for release-sync.
//!
//! Parses arguments, resolves configuration once, and reports the outcome of
//! a synchronization run on the terminal.

mod args;
pub mod commands;
mod output;

pub use args::{Args, MAX_RETRIES, RuntimeConfig};
pub use commands::execute_command;
pub use output::OutputManager;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}
