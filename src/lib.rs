//! # release_sync
//!
//! Converges a long-lived integration branch and a per-release branch into a
//! single tagged, pushed commit.
//!
//! Given a repository and a target version, a run:
//!
//! - takes a per-repository lock so only one run operates at a time,
//! - creates (or resumes) `release/v<version>` from the integration tip,
//! - rewrites version strings and file names, commits and tags the bump,
//! - merges integration forward into the release branch (release wins),
//! - lands the release on integration through a review request or an
//!   offline merge,
//! - verifies both branches point at the same commit, and
//! - prunes old release branches on the remote.
//!
//! Every remote mutation is verified against what the remote reports, and
//! every completed step is skipped on a re-run with the same version.
//!
//! ## Usage
//!
//! ```bash
//! release-sync 1.3.0
//! release-sync v1.3.0 --integration-branch develop --keep 3
//! release-sync 1.3.0 --offline --repo ../editor
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cli;
pub mod error;
pub mod git;
pub mod lock;
pub mod retry;
pub mod review;
pub mod sync;
pub mod version;

pub use cli::Args;
pub use error::{ReleaseError, Result};
pub use git::{RemoteOperations, RetryVerifiedPublisher, SystemGit};
pub use lock::{LockHandle, LockManager};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use review::{ReviewBackend, ReviewService};
pub use sync::{SyncEngine, SyncReport};
pub use version::{ReleaseVersion, VersionRewriter};

use std::path::PathBuf;
use std::time::Duration;

/// Branch namespace for release branches
pub const RELEASE_BRANCH_PREFIX: &str = "release/";

/// Configuration for a synchronization run, resolved once at startup
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Path inside the repository work tree
    pub repo_path: PathBuf,
    /// Remote to synchronize with
    pub remote: String,
    /// Long-lived integration branch
    pub integration_branch: String,
    /// Version marker file, relative to the work-tree root
    pub version_file: PathBuf,
    /// Release branches kept on the remote (0 disables pruning)
    pub keep_releases: usize,
    /// Retry behavior for remote operations
    pub retry: RetryPolicy,
    /// Upper bound for every git and review subprocess
    pub command_timeout: Duration,
    /// Explicit review API token
    pub token: Option<String>,
    /// Skip review tooling and land with an offline merge
    pub offline: bool,
    /// Allow a dirty working tree
    pub allow_dirty: bool,
    /// Directory holding lock files
    pub lock_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            remote: "origin".to_string(),
            integration_branch: "main".to_string(),
            version_file: PathBuf::from("VERSION"),
            keep_releases: 5,
            retry: RetryPolicy::default(),
            command_timeout: Duration::from_secs(120),
            token: None,
            offline: false,
            allow_dirty: false,
            lock_dir: std::env::temp_dir(),
        }
    }
}

impl SyncConfig {
    /// Resolve configuration from arguments, with environment defaults for
    /// the retry policy (flags win)
    pub fn resolve(args: &Args) -> Self {
        let env_retry = RetryPolicy::from_env();
        let retry = RetryPolicy::new(
            args.retries.unwrap_or(env_retry.max_attempts),
            args.backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(env_retry.backoff_unit),
        );

        Self {
            repo_path: args.repo.clone(),
            remote: args.remote.clone(),
            integration_branch: args.integration_branch.clone(),
            version_file: args.version_file.clone(),
            keep_releases: args.keep,
            retry,
            command_timeout: Duration::from_secs(args.timeout_secs.max(1)),
            token: args.token.clone(),
            offline: args.offline,
            allow_dirty: args.allow_dirty,
            lock_dir: args.lock_dir.clone().unwrap_or_else(std::env::temp_dir),
        }
    }
}
