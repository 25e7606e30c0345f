//! Landing through a review service, and falling back when it cannot help

use crate::helpers::*;
use anyhow::Result;
use release_sync::error::{ReviewError, Result as SyncResult};
use release_sync::review::{MergeDisposition, RequestState, ReviewRequest, ReviewService};
use release_sync::sync::LandingOutcome;
use release_sync::SyncConfig;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Merge on the remote like a hosted review would
    Merge,
    /// Merge, then delete the source branch as hosts configured to do so will
    MergeAndDeleteBranch,
    /// Report a merge while someone else pushed unrelated work to the target
    ConcurrentPush,
    /// Decline the merge for policy reasons
    Defer,
    /// Fail every call
    Unreachable,
}

/// Review service that acts on the test remote through a scratch clone
struct FakeReview {
    remote: PathBuf,
    scratch: TempDir,
    behavior: Behavior,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeReview {
    fn new(repo: &TestRepo, behavior: Behavior) -> Result<Self> {
        Ok(Self {
            remote: repo.remote.clone(),
            scratch: TempDir::new()?,
            behavior,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, call: &'static str) -> SyncResult<()> {
        self.calls.lock().unwrap().push(call);
        match self.behavior {
            Behavior::Unreachable => Err(ReviewError::Unavailable {
                reason: "review host unreachable".to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn clone_target(&self, request: &ReviewRequest, name: &str) -> Result<PathBuf> {
        let clone = self.scratch.path().join(name);
        git(
            self.scratch.path(),
            &["clone", "--branch", &request.target, &path_str(&self.remote), &path_str(&clone)],
        )?;
        configure_identity(&clone)?;
        Ok(clone)
    }

    fn merge_on_remote(&self, request: &ReviewRequest) -> Result<()> {
        let clone = self.clone_target(request, &format!("pr-{}", request.number))?;
        git(
            &clone,
            &[
                "merge",
                "--no-ff",
                "-m",
                &format!("Merge pull request #{} from {}", request.number, request.source),
                &format!("origin/{}", request.source),
            ],
        )?;
        git(&clone, &["push", "origin", &request.target])?;
        Ok(())
    }

    fn delete_source(&self, request: &ReviewRequest) -> Result<()> {
        git(
            self.scratch.path(),
            &["--git-dir", &path_str(&self.remote), "branch", "-D", &request.source],
        )?;
        Ok(())
    }

    fn push_unrelated(&self, request: &ReviewRequest) -> Result<()> {
        let clone = self.clone_target(request, "concurrent")?;
        std::fs::write(clone.join("CHANGELOG.md"), "Unrelated work\n")?;
        git(&clone, &["add", "CHANGELOG.md"])?;
        git(&clone, &["commit", "-m", "Concurrent change"])?;
        git(&clone, &["push", "origin", &request.target])?;
        Ok(())
    }

    fn act(&self, request: &ReviewRequest) -> Result<()> {
        match self.behavior {
            Behavior::Merge => self.merge_on_remote(request),
            Behavior::MergeAndDeleteBranch => {
                self.merge_on_remote(request)?;
                self.delete_source(request)
            }
            Behavior::ConcurrentPush => self.push_unrelated(request),
            Behavior::Defer | Behavior::Unreachable => Ok(()),
        }
    }
}

impl ReviewService for FakeReview {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn find_open(&self, _source: &str, _target: &str) -> SyncResult<Option<ReviewRequest>> {
        self.record("find_open")?;
        Ok(None)
    }

    async fn create(
        &self,
        source: &str,
        target: &str,
        _title: &str,
        _body: &str,
    ) -> SyncResult<ReviewRequest> {
        self.record("create")?;
        Ok(ReviewRequest {
            number: 7,
            source: source.to_string(),
            target: target.to_string(),
            state: RequestState::Open,
            url: None,
        })
    }

    async fn merge(&self, request: &ReviewRequest) -> SyncResult<MergeDisposition> {
        self.record("merge")?;
        if let Behavior::Defer = self.behavior {
            return Ok(MergeDisposition::Deferred {
                reason: "required status checks are pending".to_string(),
            });
        }
        self.act(request).map_err(|e| ReviewError::CommandFailed {
            command: "merge".to_string(),
            reason: e.to_string(),
        })?;
        Ok(MergeDisposition::Merged)
    }
}

fn online(repo: &TestRepo) -> SyncConfig {
    SyncConfig {
        offline: false,
        ..repo.config()
    }
}

#[tokio::test]
async fn test_lands_through_review() -> Result<()> {
    let repo = TestRepo::new()?;
    let review = FakeReview::new(&repo, Behavior::Merge)?;
    let report = sync_with(&online(&repo), "1.3.0", Some(&review)).await?;

    assert_eq!(review.calls(), vec!["find_open", "create", "merge"]);
    assert_eq!(
        report.landing,
        LandingOutcome::Review {
            backend: "fake".to_string(),
            number: 7,
        }
    );

    // The review merge commit lands on main; the release branch catches up.
    assert_eq!(report.convergence_rounds, 1);
    let main = repo.remote_commit("refs/heads/main")?;
    assert_eq!(main, repo.remote_commit("refs/heads/release/v1.3.0")?);
    let parents = repo.git(&["rev-list", "--parents", "-n", "1", &main])?;
    assert_eq!(parents.split_whitespace().count(), 3);
    Ok(())
}

#[tokio::test]
async fn test_release_branch_deleted_after_merge_is_republished() -> Result<()> {
    let repo = TestRepo::new()?;
    let review = FakeReview::new(&repo, Behavior::MergeAndDeleteBranch)?;

    let report = sync_with(&online(&repo), "1.3.0", Some(&review)).await?;

    // One round re-publishes the branch, the next fast-forwards it.
    assert_eq!(report.convergence_rounds, 2);
    assert_eq!(repo.remote_release_branches()?, vec!["release/v1.3.0"]);
    let main = repo.remote_commit("refs/heads/main")?;
    assert_eq!(main, repo.remote_commit("refs/heads/release/v1.3.0")?);
    assert_eq!(report.converged_commit, main);
    Ok(())
}

#[tokio::test]
async fn test_diverged_branches_are_remerged() -> Result<()> {
    let repo = TestRepo::new()?;
    let review = FakeReview::new(&repo, Behavior::ConcurrentPush)?;

    let report = sync_with(&online(&repo), "1.3.0", Some(&review)).await?;

    assert_eq!(report.convergence_rounds, 1);
    let main = repo.remote_commit("refs/heads/main")?;
    assert_eq!(main, repo.remote_commit("refs/heads/release/v1.3.0")?);
    assert_eq!(repo.remote_file("main", "CHANGELOG.md")?, "Unrelated work");
    assert_eq!(repo.remote_file("main", "VERSION")?, "1.3.0");
    let parents = repo.git(&["rev-list", "--parents", "-n", "1", &main])?;
    assert_eq!(parents.split_whitespace().count(), 3);
    Ok(())
}

#[tokio::test]
async fn test_deferred_review_falls_back_offline() -> Result<()> {
    let repo = TestRepo::new()?;
    let review = FakeReview::new(&repo, Behavior::Defer)?;

    let report = sync_with(&online(&repo), "1.3.0", Some(&review)).await?;

    match &report.landing {
        LandingOutcome::Offline {
            fallback_reason: Some(reason),
            ..
        } => assert!(reason.contains("status checks")),
        other => panic!("expected offline fallback, got {:?}", other),
    }
    assert_eq!(
        repo.remote_commit("refs/heads/main")?,
        repo.remote_commit("refs/heads/release/v1.3.0")?
    );
    Ok(())
}

#[tokio::test]
async fn test_unreachable_review_falls_back_offline() -> Result<()> {
    let repo = TestRepo::new()?;
    let review = FakeReview::new(&repo, Behavior::Unreachable)?;

    let report = sync_with(&online(&repo), "1.3.0", Some(&review)).await?;

    // Unavailability is not retried.
    assert_eq!(review.calls(), vec!["find_open"]);
    match &report.landing {
        LandingOutcome::Offline {
            fallback_reason: Some(reason),
            ..
        } => assert!(reason.contains("unreachable")),
        other => panic!("expected offline fallback, got {:?}", other),
    }
    assert_eq!(report.converged_commit, repo.remote_commit("refs/heads/main")?);
    Ok(())
}

#[tokio::test]
async fn test_offline_flag_skips_review() -> Result<()> {
    let repo = TestRepo::new()?;
    let review = FakeReview::new(&repo, Behavior::Merge)?;

    let report = sync_with(&repo.config(), "1.3.0", Some(&review)).await?;

    assert!(review.calls().is_empty());
    assert!(matches!(
        report.landing,
        LandingOutcome::Offline {
            fallback_reason: None,
            ..
        }
    ));
    Ok(())
}
