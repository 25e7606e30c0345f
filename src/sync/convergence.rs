//! Convergence verification: release and integration end on one commit.

use super::conflict::merge_with_policy;
use super::{MessageTemplates, RunContext, SyncEngine};
use crate::error::{GitError, Result, SyncError};
use crate::git::{MergeSide, PublishTarget};
use crate::review::ReviewService;

/// Corrective rounds attempted before divergence is fatal
pub const MAX_CONVERGENCE_ROUNDS: u32 = 3;

impl<V: ReviewService> SyncEngine<'_, V> {
    /// Re-read both remote tips until they match, correcting in between.
    /// Returns the converged commit and the number of corrective rounds.
    pub(super) async fn converge(&self, run: &RunContext<'_>) -> Result<(String, u32)> {
        let mut rounds = 0;

        loop {
            self.fetch().await?;
            let integration_tip = self.require_remote_tip(&run.integration).await?;
            let release_tip = self.remote_tip(&run.release).await?;

            if release_tip.as_deref() == Some(integration_tip.as_str()) {
                log::info!("{} and {} converged at {}", run.release, run.integration, integration_tip);
                return Ok((integration_tip, rounds));
            }

            if rounds >= MAX_CONVERGENCE_ROUNDS {
                return Err(SyncError::DivergenceUnresolved {
                    release: run.release.clone(),
                    release_tip: release_tip.unwrap_or_else(|| "(missing)".to_string()),
                    integration: run.integration.clone(),
                    integration_tip,
                }
                .into());
            }
            rounds += 1;

            let Some(release_tip) = release_tip else {
                self.republish_release(run).await?;
                continue;
            };

            if self.git.is_ancestor(&release_tip, &integration_tip).await? {
                log::info!("Fast-forwarding {} to {}", run.release, integration_tip);
                self.git
                    .checkout_branch_at(&run.release, &integration_tip)
                    .await?;
                self.publish(&[PublishTarget::branch(&run.release, &integration_tip)])
                    .await?;
            } else if self.git.is_ancestor(&integration_tip, &release_tip).await? {
                log::info!("Fast-forwarding {} to {}", run.integration, release_tip);
                self.publish(&[PublishTarget::branch(&run.integration, &release_tip)])
                    .await?;
            } else {
                log::warn!(
                    "{} and {} diverged; merging integration into the release branch",
                    run.release,
                    run.integration
                );
                self.git.checkout_branch_at(&run.release, &release_tip).await?;
                let message =
                    MessageTemplates::render(&self.templates.merge_forward, run.templates());
                merge_with_policy(self.git, &integration_tip, &message, MergeSide::Ours).await?;
                let head = self.git.head().await?;
                self.publish(&[
                    PublishTarget::branch(&run.release, &head),
                    PublishTarget::branch(&run.integration, &head),
                ])
                .await?;
            }
        }
    }

    /// The release branch vanished from the remote; push the local one back
    async fn republish_release(&self, run: &RunContext<'_>) -> Result<()> {
        let local = self
            .git
            .rev_parse(&format!("refs/heads/{}", run.release))
            .await?
            .ok_or_else(|| GitError::BranchOperationFailed {
                reason: format!("{} is gone both locally and on the remote", run.release),
            })?;

        log::warn!("{} was deleted on the remote; re-publishing {}", run.release, local);
        self.publish(&[PublishTarget::branch(&run.release, &local)])
            .await?;
        Ok(())
    }
}
