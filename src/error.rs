//! Error types for release synchronization.
//!
//! Every fatal condition carries an actionable message, the stage it belongs
//! to, and recovery suggestions for the terminal report.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for release_sync operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all release_sync operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Lock acquisition errors
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Version discovery and rewrite errors
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// Git operation errors
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// Review request errors
    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    /// Synchronization errors (publish, convergence)
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lock manager errors
#[derive(Error, Debug)]
pub enum LockError {
    /// Another run holds the lock for this repository
    #[error("Another release sync is already running for '{repo_id}'{}", holder_suffix(.holder_pid))]
    AlreadyRunning {
        /// Repository identity the lock guards
        repo_id: String,
        /// Process ID recorded by the holder, when readable
        holder_pid: Option<u32>,
    },

    /// Lock file could not be created or written
    #[error("Failed to acquire lock at {path}: {reason}")]
    AcquireFailed {
        /// Lock file path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },
}

fn holder_suffix(pid: &Option<u32>) -> String {
    match pid {
        Some(pid) => format!(" (held by PID {pid})"),
        None => String::new(),
    }
}

/// Version management errors
#[derive(Error, Debug)]
pub enum VersionError {
    /// Invalid version format
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion {
        /// Version string
        version: String,
        /// Reason for the error
        reason: String,
    },

    /// Version parsing failed
    #[error("Failed to parse version '{version}': {source}")]
    ParseFailed {
        /// Version string
        version: String,
        /// Parsing error
        #[source]
        source: semver::Error,
    },

    /// Rewriting a tracked file failed
    #[error("Failed to rewrite {path}: {reason}")]
    RewriteFailed {
        /// File being rewritten
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },
}

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Not a git repository
    #[error("Not a git repository: {path}")]
    NotRepository {
        /// Path that was inspected
        path: PathBuf,
    },

    /// Working directory not clean
    #[error("Working directory not clean. Commit or stash changes, or pass --allow-dirty.")]
    DirtyWorkingDirectory,

    /// The git binary could not be started
    #[error("Failed to run '{command}': {reason}")]
    SpawnFailed {
        /// Command line
        command: String,
        /// Reason for the error
        reason: String,
    },

    /// A git command exited unsuccessfully
    #[error("'{command}' failed: {stderr}")]
    CommandFailed {
        /// Command line
        command: String,
        /// Captured stderr
        stderr: String,
    },

    /// A git command exceeded its timeout
    #[error("'{command}' timed out after {seconds}s")]
    Timeout {
        /// Command line
        command: String,
        /// Timeout in seconds
        seconds: u64,
    },

    /// A merge could not be completed
    #[error("Merge failed: {reason}")]
    MergeFailed {
        /// Reason for the error
        reason: String,
    },

    /// Branch operation failed
    #[error("Git branch operation failed: {reason}")]
    BranchOperationFailed {
        /// Reason for the error
        reason: String,
    },
}

/// Review request errors
#[derive(Error, Debug)]
pub enum ReviewError {
    /// No review mechanism can be used
    #[error("Review tooling unavailable: {reason}")]
    Unavailable {
        /// Reason for the error
        reason: String,
    },

    /// The review CLI exited unsuccessfully
    #[error("'{command}' failed: {reason}")]
    CommandFailed {
        /// Command line
        command: String,
        /// Reason for the error
        reason: String,
    },

    /// The review API answered with an error status
    #[error("Review API returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The review API could not be reached
    #[error("Review API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Output from the review tool could not be understood
    #[error("Unexpected review response: {reason}")]
    UnexpectedResponse {
        /// Reason for the error
        reason: String,
    },
}

/// Synchronization errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote tips did not match the pushed commits on one attempt
    #[error("Remote '{remote}' does not show {refname} at {expected} (observed {})", .observed.as_deref().unwrap_or("nothing"))]
    PushUnverified {
        /// Remote name
        remote: String,
        /// Remote ref
        refname: String,
        /// Expected commit
        expected: String,
        /// Observed commit
        observed: Option<String>,
    },

    /// Publishing never converged on the remote
    #[error("Push of {refs} to '{remote}' did not land after {attempts} attempt(s): {last_error}")]
    PushExhausted {
        /// Remote name
        remote: String,
        /// Refs being published
        refs: String,
        /// Attempts made
        attempts: u32,
        /// Last failure observed
        last_error: String,
    },

    /// A retried remote operation never succeeded
    #[error("{operation} failed after {attempts} attempt(s): {last_error}")]
    RetryExhausted {
        /// Operation name
        operation: String,
        /// Attempts made
        attempts: u32,
        /// Last failure observed
        last_error: String,
    },

    /// Release and integration branches could not be made identical
    #[error(
        "Branches did not converge: {release} at {release_tip}, {integration} at {integration_tip}"
    )]
    DivergenceUnresolved {
        /// Release branch
        release: String,
        /// Release branch tip
        release_tip: String,
        /// Integration branch
        integration: String,
        /// Integration branch tip
        integration_tip: String,
    },

    /// The operator interrupted the run
    #[error("Interrupted by operator")]
    Interrupted,
}

impl ReleaseError {
    /// Name of the synchronization stage this error belongs to
    pub fn stage(&self) -> &'static str {
        match self {
            ReleaseError::Lock(_) => "lock acquisition",
            ReleaseError::Version(_) => "version rewrite",
            ReleaseError::Git(GitError::MergeFailed { .. }) => "merge",
            ReleaseError::Git(_) => "git",
            ReleaseError::Review(_) => "review request",
            ReleaseError::Sync(SyncError::PushUnverified { .. })
            | ReleaseError::Sync(SyncError::PushExhausted { .. }) => "publish",
            ReleaseError::Sync(SyncError::RetryExhausted { .. }) => "remote operation",
            ReleaseError::Sync(SyncError::DivergenceUnresolved { .. }) => "convergence",
            ReleaseError::Sync(SyncError::Interrupted) => "interrupt",
            ReleaseError::Io(_) | ReleaseError::Json(_) => "io",
        }
    }

    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ReleaseError::Lock(LockError::AlreadyRunning { holder_pid, .. }) => {
                let mut suggestions =
                    vec!["Wait for the running release sync to finish, then retry".to_string()];
                if let Some(pid) = holder_pid {
                    suggestions.push(format!("Inspect the holder process: ps -p {pid}"));
                }
                suggestions
            }
            ReleaseError::Git(GitError::DirtyWorkingDirectory) => vec![
                "Commit pending changes: git add . && git commit -m 'message'".to_string(),
                "Stash changes temporarily: git stash".to_string(),
            ],
            ReleaseError::Git(GitError::NotRepository { .. }) => {
                vec!["Run from inside a git work tree or pass --repo <PATH>".to_string()]
            }
            ReleaseError::Sync(SyncError::PushExhausted { remote, .. }) => vec![
                format!("Check connectivity and permissions: git ls-remote {remote}"),
                "Re-run the same version; every completed step is skipped".to_string(),
            ],
            ReleaseError::Sync(SyncError::DivergenceUnresolved {
                release,
                integration,
                ..
            }) => vec![
                format!("Compare the branches: git log --oneline --graph {release} {integration}"),
                "Resolve the divergence by hand, then re-run the same version".to_string(),
            ],
            ReleaseError::Version(VersionError::InvalidVersion { .. })
            | ReleaseError::Version(VersionError::ParseFailed { .. }) => {
                vec!["Pass a semantic version such as 1.3.0".to_string()]
            }
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Check if this error is worth retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            ReleaseError::Git(GitError::CommandFailed { .. })
            | ReleaseError::Git(GitError::Timeout { .. }) => true,
            ReleaseError::Sync(SyncError::PushUnverified { .. }) => true,
            ReleaseError::Review(ReviewError::Transport(_)) => true,
            ReleaseError::Review(ReviewError::Http { status, .. }) => *status >= 500,
            ReleaseError::Review(ReviewError::CommandFailed { .. }) => true,
            ReleaseError::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_running_names_holder() {
        let err = ReleaseError::from(LockError::AlreadyRunning {
            repo_id: "git@example.com:acme/editor.git".to_string(),
            holder_pid: Some(4242),
        });
        assert!(err.to_string().contains("PID 4242"));
        assert_eq!(err.stage(), "lock acquisition");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_push_unverified_is_recoverable() {
        let err = ReleaseError::from(SyncError::PushUnverified {
            remote: "origin".to_string(),
            refname: "refs/heads/main".to_string(),
            expected: "abc".to_string(),
            observed: None,
        });
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("observed nothing"));
    }

    #[test]
    fn test_exhaustion_and_divergence_are_terminal() {
        let exhausted = ReleaseError::from(SyncError::PushExhausted {
            remote: "origin".to_string(),
            refs: "refs/heads/main".to_string(),
            attempts: 3,
            last_error: "rejected".to_string(),
        });
        assert!(!exhausted.is_recoverable());
        assert_eq!(exhausted.stage(), "publish");

        let diverged = ReleaseError::from(SyncError::DivergenceUnresolved {
            release: "release/v1.3.0".to_string(),
            release_tip: "a".to_string(),
            integration: "main".to_string(),
            integration_tip: "b".to_string(),
        });
        assert!(!diverged.is_recoverable());
        assert_eq!(diverged.stage(), "convergence");
    }

    #[test]
    fn test_http_server_errors_only_are_recoverable() {
        let server = ReleaseError::from(ReviewError::Http {
            status: 502,
            body: String::new(),
        });
        let client = ReleaseError::from(ReviewError::Http {
            status: 404,
            body: String::new(),
        });
        assert!(server.is_recoverable());
        assert!(!client.is_recoverable());
    }
}
