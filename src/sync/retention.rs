//! Retention pruning of old release branches on the remote.

use super::results::RetentionReport;
use super::{RunContext, SyncEngine};
use crate::error::Result;
use crate::git::RemoteBranch;
use crate::review::ReviewService;
use crate::version::ReleaseVersion;
use crate::RELEASE_BRANCH_PREFIX;
use std::cmp::Ordering;

/// Split release branches into `(kept, pruned)`.
///
/// Branches are ordered newest first by creation time, ties broken by
/// version and then name, both descending. The first `keep` survive, and
/// `protect` (the release being synchronized) is never pruned.
pub fn select_for_pruning(
    mut branches: Vec<RemoteBranch>,
    keep: usize,
    protect: &str,
) -> (Vec<RemoteBranch>, Vec<RemoteBranch>) {
    branches.sort_by(newest_first);

    let mut kept = Vec::new();
    let mut pruned = Vec::new();
    for branch in branches {
        if kept.len() < keep || branch.name == protect {
            kept.push(branch);
        } else {
            pruned.push(branch);
        }
    }
    (kept, pruned)
}

fn newest_first(a: &RemoteBranch, b: &RemoteBranch) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| branch_version(b).cmp(&branch_version(a)))
        .then_with(|| b.name.cmp(&a.name))
}

/// Unparsable names compare below every version
fn branch_version(branch: &RemoteBranch) -> Option<semver::Version> {
    let raw = branch.name.strip_prefix(RELEASE_BRANCH_PREFIX)?;
    ReleaseVersion::parse(raw).ok().map(|v| v.semver().clone())
}

impl<V: ReviewService> SyncEngine<'_, V> {
    /// Delete remote release branches outside the retention window
    pub(super) async fn prune(&self, run: &RunContext<'_>) -> Result<RetentionReport> {
        let keep = self.config.keep_releases;
        if keep == 0 {
            log::info!("Retention pruning disabled");
            return Ok(RetentionReport {
                disabled: true,
                ..RetentionReport::default()
            });
        }

        self.fetch().await?;
        let branches = self
            .git
            .remote_branches(&self.config.remote, RELEASE_BRANCH_PREFIX)
            .await?;
        let (kept, pruned) = select_for_pruning(branches, keep, &run.release);

        let mut report = RetentionReport {
            kept: kept.into_iter().map(|b| b.name).collect(),
            ..RetentionReport::default()
        };

        let publisher = self.publisher();
        for branch in pruned {
            match publisher.delete_branch(&branch.name).await {
                Ok(attempts) => {
                    self.push_attempts.set(self.push_attempts.get() + attempts);
                    log::info!("Pruned {}", branch.name);
                    report.deleted.push(branch.name);
                }
                Err(e) => {
                    log::warn!("Could not prune {}: {}", branch.name, e);
                    report.failed.push((branch.name, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
