//! Release branch lifecycle: create, bump, tag, publish, merge forward.

use super::conflict::merge_with_policy;
use super::results::{BranchOrigin, BumpSummary, TagOutcome};
use super::{MessageTemplates, RunContext, SyncEngine};
use crate::error::{GitError, Result};
use crate::git::{MergeSide, PublishTarget};
use crate::review::ReviewService;
use crate::version::{discover_old_version, ReleaseVersion, VersionRewriter};
use std::path::PathBuf;

impl<V: ReviewService> SyncEngine<'_, V> {
    /// Check out the release branch, creating and publishing it from the
    /// integration tip when the remote does not have it yet
    pub(super) async fn ensure_release_branch(&self, run: &RunContext<'_>) -> Result<BranchOrigin> {
        let integration_tip = self.require_remote_tip(&run.integration).await?;
        let local = self
            .git
            .rev_parse(&format!("refs/heads/{}", run.release))
            .await?;

        if let Some(remote_tip) = self.remote_tip(&run.release).await? {
            // A local branch ahead of the remote holds work from an interrupted run.
            let start = match local {
                Some(local) if local != remote_tip => {
                    if self.git.is_ancestor(&remote_tip, &local).await? {
                        log::info!("Resuming local {} ahead of the remote", run.release);
                        local
                    } else {
                        remote_tip
                    }
                }
                _ => remote_tip,
            };
            self.git.checkout_branch_at(&run.release, &start).await?;
            log::info!("Release branch {} already exists on {}", run.release, self.config.remote);
            return Ok(BranchOrigin::Existing);
        }

        let resumable = match &local {
            Some(local) => self.git.is_ancestor(&integration_tip, local).await?,
            None => false,
        };
        let start = match local {
            Some(local) if resumable => {
                log::info!("Resuming unpublished local {}", run.release);
                local
            }
            _ => integration_tip,
        };

        self.git.checkout_branch_at(&run.release, &start).await?;
        self.publish(&[PublishTarget::branch(&run.release, &start)])
            .await?;
        log::info!("Created {} at {}", run.release, start);
        Ok(BranchOrigin::Created)
    }

    /// Rewrite version strings and commit the result if anything changed
    pub(super) async fn apply_bump(&self, run: &RunContext<'_>) -> Result<BumpSummary> {
        let work_tree = self.git.work_tree();
        let marker = tokio::fs::read_to_string(work_tree.join(&self.config.version_file))
            .await
            .ok();
        let latest_tag = self.git.latest_version_tag().await?;
        let old = discover_old_version(latest_tag.as_deref(), marker.as_deref());

        match &old {
            Some(old) => log::info!("Rewriting {} -> {}", old, run.version),
            None => log::info!("No previous version found; writing marker only"),
        }

        let tracked = self.git.tracked_files().await?;
        let rewrite = VersionRewriter::new(work_tree, &self.config.version_file).rewrite(
            &tracked,
            old.as_ref().map(ReleaseVersion::as_str),
            run.version.as_str(),
        )?;

        self.git.stage_paths(&rewrite.touched_paths()).await?;

        let mut summary = BumpSummary {
            old_version: old.map(|v| v.as_str().to_string()),
            commit: None,
            renamed: rewrite.renamed,
            modified: rewrite.modified,
        };

        if !self.git.has_staged_changes().await? {
            log::info!("Tree already at {}; no bump commit needed", run.version);
            return Ok(summary);
        }

        let message = MessageTemplates::render(&self.templates.bump_commit, run.templates());
        let commit = self.git.commit(&message).await?;
        log::info!("Committed version bump {}", commit);
        summary.commit = Some(commit);
        Ok(summary)
    }

    /// Point the release tag at the bump commit.
    ///
    /// Without a bump commit an existing tag is left alone and a missing tag
    /// is created at the release tip.
    pub(super) async fn tag_release(
        &self,
        run: &RunContext<'_>,
        bump_commit: Option<&str>,
    ) -> Result<TagOutcome> {
        let existing = self.git.tag_commit(&run.tag).await?;
        let message = MessageTemplates::render(&self.templates.tag, run.templates());

        let outcome = match (bump_commit, existing) {
            (Some(commit), Some(previous)) if previous == commit => TagOutcome::Unchanged(previous),
            (Some(commit), Some(previous)) => {
                self.git.create_tag(&run.tag, &message, commit, true).await?;
                TagOutcome::Moved {
                    from: previous,
                    to: commit.to_string(),
                }
            }
            (Some(commit), None) => {
                self.git.create_tag(&run.tag, &message, commit, false).await?;
                TagOutcome::Created(commit.to_string())
            }
            (None, Some(previous)) => TagOutcome::Unchanged(previous),
            (None, None) => {
                let tip = self.git.head().await?;
                self.git.create_tag(&run.tag, &message, &tip, false).await?;
                TagOutcome::Created(tip)
            }
        };

        log::info!("Tag {}: {:?}", run.tag, outcome);
        Ok(outcome)
    }

    /// Publish the release branch and its tag in one verified push
    pub(super) async fn publish_release(&self, run: &RunContext<'_>) -> Result<()> {
        let tip = self.git.head().await?;
        let tag_object = self
            .git
            .ref_object(&format!("refs/tags/{}", run.tag))
            .await?
            .ok_or_else(|| GitError::BranchOperationFailed {
                reason: format!("tag {} vanished before publishing", run.tag),
            })?;

        self.publish(&[
            PublishTarget::branch(&run.release, &tip),
            PublishTarget::tag(&run.tag, &tag_object),
        ])
        .await?;
        Ok(())
    }

    /// Merge the latest integration tip into the release branch, release
    /// content winning every conflict, and publish the result
    pub(super) async fn merge_forward(&self, run: &RunContext<'_>) -> Result<Vec<PathBuf>> {
        self.fetch().await?;
        let integration_tip = self.require_remote_tip(&run.integration).await?;
        let message = MessageTemplates::render(&self.templates.merge_forward, run.templates());

        let merged = merge_with_policy(self.git, &integration_tip, &message, MergeSide::Ours).await?;

        if let Some(head) = merged.new_head() {
            log::info!("Merged {} forward into {}", run.integration, run.release);
            self.publish(&[PublishTarget::branch(&run.release, head)])
                .await?;
        }

        Ok(merged.resolved)
    }
}
