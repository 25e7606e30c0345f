//! Results reported by a synchronization run.

use crate::version::ReleaseVersion;
use std::path::PathBuf;

/// How the release branch came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOrigin {
    /// Created from the integration tip during this run
    Created,
    /// Already present on the remote
    Existing,
}

/// What happened to the release tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// Tag created at the given commit
    Created(String),
    /// Tag force-moved to a new bump commit
    Moved {
        /// Previous target
        from: String,
        /// New target
        to: String,
    },
    /// Tag already in place
    Unchanged(String),
}

impl TagOutcome {
    /// Commit the tag points at after the run
    pub fn commit(&self) -> &str {
        match self {
            TagOutcome::Created(commit) | TagOutcome::Unchanged(commit) => commit,
            TagOutcome::Moved { to, .. } => to,
        }
    }
}

/// How the release reached the integration branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LandingOutcome {
    /// Release was not ahead of integration
    AlreadyConverged,
    /// Merged through a review request
    Review {
        /// Backend used
        backend: String,
        /// Request number
        number: u64,
    },
    /// Merged locally and pushed
    Offline {
        /// Integration tip after the merge
        commit: String,
        /// Why the review path was not used, if it was attempted
        fallback_reason: Option<String>,
    },
}

/// Outcome of the version bump step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BumpSummary {
    /// Version replaced, if one was found
    pub old_version: Option<String>,
    /// Bump commit, when the tree changed
    pub commit: Option<String>,
    /// Renamed files (old, new)
    pub renamed: Vec<(PathBuf, PathBuf)>,
    /// Files whose contents were rewritten
    pub modified: Vec<PathBuf>,
}

/// Outcome of retention pruning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Branches kept, newest first
    pub kept: Vec<String>,
    /// Branches deleted from the remote
    pub deleted: Vec<String>,
    /// Branches whose deletion failed, with the reason
    pub failed: Vec<(String, String)>,
    /// Whether pruning was disabled (`keep == 0`)
    pub disabled: bool,
}

/// Everything a run did, for the terminal summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Target version
    pub version: ReleaseVersion,
    /// Release branch name
    pub release_branch: String,
    /// Integration branch name
    pub integration_branch: String,
    /// Whether the release branch was created in this run
    pub origin: BranchOrigin,
    /// Version bump outcome
    pub bump: BumpSummary,
    /// Tag name
    pub tag: String,
    /// Tag outcome
    pub tag_outcome: TagOutcome,
    /// Conflicted paths resolved in favor of the release branch
    pub conflicts_resolved: Vec<PathBuf>,
    /// Landing outcome
    pub landing: LandingOutcome,
    /// Commit both branches point at
    pub converged_commit: String,
    /// Convergence rounds that needed action
    pub convergence_rounds: u32,
    /// Total push attempts across all publishes
    pub push_attempts: u32,
    /// Retention outcome
    pub retention: RetentionReport,
}
