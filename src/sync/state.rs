//! Release branch lifecycle phases.

use std::fmt;

/// Where the release branch is in its lifecycle during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BranchPhase {
    /// Not on the remote yet
    Absent,
    /// Created from the integration tip and published
    Created,
    /// Found on the remote from an earlier run
    Existing,
    /// Version bump applied (or already present)
    BumpCommitted,
    /// Tag points at the bump commit
    Tagged,
    /// Branch and tag published together
    Published,
    /// Latest integration merged into the release branch
    MergedForward,
    /// Release landed on integration
    Landed,
    /// Both branches point at the same commit
    Converged,
    /// Old release branches pruned
    Pruned,
}

impl fmt::Display for BranchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BranchPhase::Absent => "absent",
            BranchPhase::Created => "created",
            BranchPhase::Existing => "existing",
            BranchPhase::BumpCommitted => "bump committed",
            BranchPhase::Tagged => "tagged",
            BranchPhase::Published => "published",
            BranchPhase::MergedForward => "merged forward",
            BranchPhase::Landed => "landed",
            BranchPhase::Converged => "converged",
            BranchPhase::Pruned => "pruned",
        };
        f.write_str(name)
    }
}
