//! Command execution coordinating configuration, locking and the engine.

mod sync;

use crate::cli::{Args, RuntimeConfig};
use crate::error::Result;

use sync::execute_sync;

/// Exit code for arguments rejected after parsing, matching clap's usage errors
pub const EXIT_USAGE: i32 = 2;

/// Exit code after an operator interrupt
pub const EXIT_INTERRUPTED: i32 = 130;

/// Execute a synchronization run for the parsed arguments
pub async fn execute_command(args: Args) -> Result<i32> {
    if let Err(validation_error) = args.validate() {
        // Validation errors are never quiet
        let output = super::OutputManager::new(false, false);
        output.error(&format!("Invalid arguments: {}", validation_error));
        return Ok(EXIT_USAGE);
    }

    let config = RuntimeConfig::from(&args);
    execute_sync(&args, &config).await
}
