//! Conflict policy: the release branch's side always wins.
//!
//! If the release side still has content at a conflicted path, that content
//! is taken; otherwise the path is deleted. So a path the release branch
//! modified and integration deleted keeps the release content, and a path the
//! release branch deleted stays deleted.

use crate::error::Result;
use crate::git::{ConflictEntry, ConflictKind, MergeOutcome, MergeSide, SystemGit};
use std::path::PathBuf;

/// How a single conflicted path is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Take the content from this side
    Take(MergeSide),
    /// Delete the path
    Delete,
}

/// Resolution for a conflict when `release_side` is the release branch
pub fn resolution_for(kind: ConflictKind, release_side: MergeSide) -> Resolution {
    let release_has_content = match release_side {
        MergeSide::Ours => kind.ours_has_content(),
        MergeSide::Theirs => kind.theirs_has_content(),
    };

    if release_has_content {
        Resolution::Take(release_side)
    } else {
        Resolution::Delete
    }
}

/// A merge with conflicts already settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyMerge {
    /// Final outcome; never `Conflicted`
    pub outcome: MergeOutcome,
    /// Paths resolved by policy
    pub resolved: Vec<PathBuf>,
}

impl PolicyMerge {
    /// New HEAD when the merge moved it
    pub fn new_head(&self) -> Option<&str> {
        match &self.outcome {
            MergeOutcome::FastForward(commit) | MergeOutcome::MergeCommit(commit) => {
                Some(commit.as_str())
            }
            _ => None,
        }
    }
}

/// Merge `rev` into HEAD, settling conflicts in favor of `release_side`
pub async fn merge_with_policy(
    git: &SystemGit,
    rev: &str,
    message: &str,
    release_side: MergeSide,
) -> Result<PolicyMerge> {
    let entries = match git.merge(rev, message).await? {
        MergeOutcome::Conflicted(entries) => entries,
        outcome => {
            return Ok(PolicyMerge {
                outcome,
                resolved: Vec::new(),
            });
        }
    };

    let settled = match settle(git, &entries, release_side).await {
        Ok(()) => git.commit_merge(message).await,
        Err(e) => Err(e),
    };
    let commit = match settled {
        Ok(commit) => commit,
        Err(e) => {
            if let Err(abort) = git.abort_merge().await {
                log::warn!("Failed to abort merge after resolution error: {}", abort);
            }
            return Err(e);
        }
    };
    log::info!(
        "Resolved {} conflicted path(s) in favor of the release branch",
        entries.len()
    );

    Ok(PolicyMerge {
        outcome: MergeOutcome::MergeCommit(commit),
        resolved: entries.into_iter().map(|entry| entry.path).collect(),
    })
}

async fn settle(git: &SystemGit, entries: &[ConflictEntry], release_side: MergeSide) -> Result<()> {
    for entry in entries {
        let resolution = resolution_for(entry.kind, release_side);
        log::debug!("{}: {:?} -> {:?}", entry.path.display(), entry.kind, resolution);
        match resolution {
            Resolution::Take(side) => git.take_side(&entry.path, side).await?,
            Resolution::Delete => git.remove_path(&entry.path).await?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_modification_beats_integration_deletion() {
        // Release is ours, integration deleted the file: UD
        assert_eq!(
            resolution_for(ConflictKind::DeletedByThem, MergeSide::Ours),
            Resolution::Take(MergeSide::Ours)
        );
        // Release is theirs, integration deleted the file: DU
        assert_eq!(
            resolution_for(ConflictKind::DeletedByUs, MergeSide::Theirs),
            Resolution::Take(MergeSide::Theirs)
        );
    }

    #[test]
    fn test_release_deletion_stays_deleted() {
        assert_eq!(
            resolution_for(ConflictKind::DeletedByUs, MergeSide::Ours),
            Resolution::Delete
        );
        assert_eq!(
            resolution_for(ConflictKind::DeletedByThem, MergeSide::Theirs),
            Resolution::Delete
        );
        assert_eq!(
            resolution_for(ConflictKind::BothDeleted, MergeSide::Ours),
            Resolution::Delete
        );
    }

    #[test]
    fn test_content_conflicts_take_release() {
        for kind in [ConflictKind::BothModified, ConflictKind::BothAdded] {
            assert_eq!(
                resolution_for(kind, MergeSide::Ours),
                Resolution::Take(MergeSide::Ours)
            );
            assert_eq!(
                resolution_for(kind, MergeSide::Theirs),
                Resolution::Take(MergeSide::Theirs)
            );
        }
        assert_eq!(
            resolution_for(ConflictKind::AddedByThem, MergeSide::Ours),
            Resolution::Delete
        );
        assert_eq!(
            resolution_for(ConflictKind::AddedByUs, MergeSide::Ours),
            Resolution::Take(MergeSide::Ours)
        );
    }
}
