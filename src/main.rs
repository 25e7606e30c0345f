//! release-sync: converge a release branch and the integration branch on
//! one tagged, pushed commit.
//!
//! Logging goes through `env_logger` (`RUST_LOG=release_sync=debug` shows
//! every git command line); progress and summaries go to the terminal.

use release_sync::cli;
use release_sync::cli::OutputManager;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            // Fatal errors are never quiet
            let output = OutputManager::new(false, false);
            output.error(&format!("Fatal error: {e}"));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                let _ = output.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    let _ = output.indent(&suggestion);
                }
            }

            process::exit(1);
        }
    }
}
