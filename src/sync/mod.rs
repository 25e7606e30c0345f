//! Release synchronization engine.
//!
//! [`SyncEngine::run`] drives one release through its lifecycle:
//!
//! 1. ensure `release/v<version>` exists (created from the integration tip),
//! 2. apply and commit the version bump, then tag it,
//! 3. publish branch and tag together,
//! 4. merge integration forward into the release branch (release wins),
//! 5. land the release on integration (review request or offline merge),
//! 6. verify both branches point at the same commit, and
//! 7. prune release branches outside the retention window.
//!
//! Steps are strictly sequential and each re-reads remote tips before it
//! mutates anything, so a re-run after an interruption picks up where the
//! last one stopped.

mod config;
mod conflict;
mod convergence;
mod integration;
mod lifecycle;
mod results;
mod retention;
mod state;

pub use config::{MessageTemplates, TemplateContext};
pub use conflict::{merge_with_policy, resolution_for, PolicyMerge, Resolution};
pub use convergence::MAX_CONVERGENCE_ROUNDS;
pub use results::{
    BranchOrigin, BumpSummary, LandingOutcome, RetentionReport, SyncReport, TagOutcome,
};
pub use retention::select_for_pruning;
pub use state::BranchPhase;

use crate::error::{GitError, Result};
use crate::git::{PublishTarget, PushReport, RemoteOperations, RetryVerifiedPublisher, SystemGit};
use crate::retry::retry_with_backoff;
use crate::review::ReviewService;
use crate::version::ReleaseVersion;
use crate::SyncConfig;
use std::cell::Cell;

/// Names derived from the target version for one run
#[derive(Debug, Clone)]
pub(crate) struct RunContext<'v> {
    pub(crate) version: &'v ReleaseVersion,
    pub(crate) release: String,
    pub(crate) integration: String,
    pub(crate) tag: String,
}

impl<'v> RunContext<'v> {
    fn new(version: &'v ReleaseVersion, integration: &str) -> Self {
        Self {
            version,
            release: version.release_branch(),
            integration: integration.to_string(),
            tag: version.tag_name(),
        }
    }

    fn templates(&self) -> TemplateContext<'_> {
        TemplateContext {
            version: self.version,
            release: &self.release,
            integration: &self.integration,
        }
    }
}

/// Drives a release through its lifecycle against one repository
#[derive(Debug)]
pub struct SyncEngine<'a, V: ReviewService> {
    git: &'a SystemGit,
    config: &'a SyncConfig,
    review: Option<&'a V>,
    templates: MessageTemplates,
    push_attempts: Cell<u32>,
    phase: Cell<BranchPhase>,
}

impl<'a, V: ReviewService> SyncEngine<'a, V> {
    /// Engine for `git`; `review` is `None` for offline landing
    pub fn new(git: &'a SystemGit, config: &'a SyncConfig, review: Option<&'a V>) -> Self {
        Self {
            git,
            config,
            review,
            templates: MessageTemplates::default(),
            push_attempts: Cell::new(0),
            phase: Cell::new(BranchPhase::Absent),
        }
    }

    /// Last lifecycle phase reached
    pub fn phase(&self) -> BranchPhase {
        self.phase.get()
    }

    /// Synchronize `version` end to end
    pub async fn run(&self, version: &ReleaseVersion) -> Result<SyncReport> {
        if self.git.merge_in_progress().await? {
            log::warn!("Aborting a merge left in progress by an interrupted run");
            self.git.abort_merge().await?;
        }

        if !self.config.allow_dirty && !self.git.is_clean().await? {
            return Err(GitError::DirtyWorkingDirectory.into());
        }

        let original_branch = self.git.current_branch().await?;
        let run = RunContext::new(version, &self.config.integration_branch);
        log::info!(
            "Synchronizing {} with {} on {}",
            run.release,
            run.integration,
            self.config.remote
        );

        let result = self.run_steps(&run).await;

        if let Some(branch) = original_branch.filter(|b| *b != run.release) {
            if let Err(e) = self.git.checkout(&branch).await {
                log::warn!("Could not return to branch {}: {}", branch, e);
            }
        }

        result
    }

    async fn run_steps(&self, run: &RunContext<'_>) -> Result<SyncReport> {
        self.fetch().await?;

        let origin = self.ensure_release_branch(run).await?;
        self.enter(match origin {
            BranchOrigin::Created => BranchPhase::Created,
            BranchOrigin::Existing => BranchPhase::Existing,
        });

        let bump = self.apply_bump(run).await?;
        self.enter(BranchPhase::BumpCommitted);

        let tag_outcome = self.tag_release(run, bump.commit.as_deref()).await?;
        self.enter(BranchPhase::Tagged);

        self.publish_release(run).await?;
        self.enter(BranchPhase::Published);

        let conflicts_resolved = self.merge_forward(run).await?;
        self.enter(BranchPhase::MergedForward);

        let landing = self.land(run).await?;
        self.enter(BranchPhase::Landed);

        let (converged_commit, convergence_rounds) = self.converge(run).await?;
        self.enter(BranchPhase::Converged);

        let retention = self.prune(run).await?;
        self.enter(BranchPhase::Pruned);

        Ok(SyncReport {
            version: run.version.clone(),
            release_branch: run.release.clone(),
            integration_branch: run.integration.clone(),
            origin,
            bump,
            tag: run.tag.clone(),
            tag_outcome,
            conflicts_resolved,
            landing,
            converged_commit,
            convergence_rounds,
            push_attempts: self.push_attempts.get(),
            retention,
        })
    }

    fn enter(&self, phase: BranchPhase) {
        log::info!("Release branch {}", phase);
        self.phase.set(phase);
    }

    /// Fetch branches and tags with retries
    async fn fetch(&self) -> Result<()> {
        let remote = self.config.remote.as_str();
        retry_with_backoff(&self.config.retry, &format!("fetch {}", remote), |_| {
            self.git.fetch(remote)
        })
        .await
    }

    /// Tip of a branch as last fetched from the remote
    async fn remote_tip(&self, branch: &str) -> Result<Option<String>> {
        self.git
            .rev_parse(&format!("refs/remotes/{}/{}", self.config.remote, branch))
            .await
    }

    async fn require_remote_tip(&self, branch: &str) -> Result<String> {
        self.remote_tip(branch).await?.ok_or_else(|| {
            GitError::BranchOperationFailed {
                reason: format!(
                    "branch '{}' does not exist on remote '{}'",
                    branch, self.config.remote
                ),
            }
            .into()
        })
    }

    fn publisher(&self) -> RetryVerifiedPublisher<'_, SystemGit> {
        RetryVerifiedPublisher::new(self.git, &self.config.remote, &self.config.retry)
    }

    /// Publish through the retry-verified publisher, counting attempts
    async fn publish(&self, targets: &[PublishTarget]) -> Result<PushReport> {
        let report = self.publisher().publish(targets).await?;
        self.push_attempts
            .set(self.push_attempts.get() + report.attempts);
        Ok(report)
    }
}

/// Repository identity used for locking: the remote URL, or the canonical
/// work-tree path when the remote has no readable URL
pub async fn repository_identity(git: &SystemGit, remote: &str) -> Result<String> {
    if let Some(url) = git.remote_url(remote).await? {
        return Ok(url);
    }
    let path = std::fs::canonicalize(git.work_tree())?;
    Ok(path.to_string_lossy().into_owned())
}
