//! Command line argument parsing and validation.
//!
//! One invocation synchronizes one version: point it at a repository, give
//! it the version, and it converges the release and integration branches.

use clap::Parser;
use std::path::PathBuf;

/// Highest accepted `--retries` value
pub const MAX_RETRIES: u32 = 10;

/// Release branch synchronization for a single repository
#[derive(Parser, Debug, Clone)]
#[command(
    name = "release-sync",
    version,
    about = "Converge a release branch and the integration branch on one tagged commit",
    long_about = "Create or resume release/v<VERSION>, commit and tag the version bump, merge the
integration branch forward, land the release (review request or offline merge),
verify both branches point at the same commit, and prune old release branches.

Usage:
  release-sync 1.3.0
  release-sync v1.3.0 --integration-branch develop --keep 3
  release-sync 1.3.0 --offline --repo ../editor"
)]
pub struct Args {
    /// Target version (`1.3.0` or `v1.3.0`)
    #[arg(id = "target_version", index = 1, value_name = "VERSION")]
    pub version: String,

    /// Repository work tree
    #[arg(long, value_name = "PATH", default_value = ".")]
    pub repo: PathBuf,

    /// Remote to synchronize with
    #[arg(long, value_name = "NAME", default_value = "origin")]
    pub remote: String,

    /// Long-lived integration branch
    #[arg(long, value_name = "NAME", default_value = "main")]
    pub integration_branch: String,

    /// Version marker file, relative to the work-tree root
    #[arg(long, value_name = "PATH", default_value = "VERSION")]
    pub version_file: PathBuf,

    /// Release branches kept on the remote (0 disables pruning)
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub keep: usize,

    /// Attempts per remote operation [env: RELEASE_SYNC_RETRIES, default 3]
    #[arg(long, value_name = "K")]
    pub retries: Option<u32>,

    /// Linear backoff unit in seconds [env: RELEASE_SYNC_BACKOFF_SECS, default 2]
    #[arg(long, value_name = "S")]
    pub backoff_secs: Option<u64>,

    /// Timeout for every git and review subprocess
    #[arg(long, value_name = "S", default_value_t = 120)]
    pub timeout_secs: u64,

    /// Review API token
    #[arg(long, value_name = "TOKEN", env = "GH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Skip review tooling and land with an offline merge
    #[arg(long)]
    pub offline: bool,

    /// Run even if the working tree has uncommitted changes
    #[arg(long)]
    pub allow_dirty: bool,

    /// Directory for the per-repository lock file [default: system temp dir]
    #[arg(long, value_name = "PATH")]
    pub lock_dir: Option<PathBuf>,

    /// Show detailed progress
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.version.trim().is_empty() {
            return Err("Version is required".to_string());
        }

        if self.remote.trim().is_empty() {
            return Err("Remote name must not be empty".to_string());
        }

        if self.integration_branch.trim().is_empty() {
            return Err("Integration branch must not be empty".to_string());
        }

        if self
            .integration_branch
            .starts_with(crate::RELEASE_BRANCH_PREFIX)
        {
            return Err(format!(
                "Integration branch '{}' lies inside the release branch namespace",
                self.integration_branch
            ));
        }

        if let Some(retries) = self.retries
            && !(1..=MAX_RETRIES).contains(&retries)
        {
            return Err(format!(
                "--retries must be between 1 and {}, got {}",
                MAX_RETRIES, retries
            ));
        }

        if self.version_file.is_absolute() {
            return Err("--version-file must be relative to the repository root".to_string());
        }

        Ok(())
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
}

impl RuntimeConfig {
    /// Create runtime configuration
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            output: super::OutputManager::new(verbose, quiet),
        }
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print verbose message
    pub fn verbose_println(&self, message: &str) {
        let _ = self.output.verbose(message);
    }

    /// Print error message (always shown)
    pub fn error_println(&self, message: &str) {
        self.output.error(message);
    }

    /// Print warning message
    pub fn warning_println(&self, message: &str) {
        let _ = self.output.warn(message);
    }

    /// Print success message
    pub fn success_println(&self, message: &str) {
        let _ = self.output.success(message);
    }

    /// Print progress message
    pub fn progress_println(&self, message: &str) {
        let _ = self.output.progress(message);
    }

    /// Print indented text
    pub fn indent(&self, message: &str) {
        let _ = self.output.indent(message);
    }
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self::new(args.verbose, args.quiet)
    }
}
