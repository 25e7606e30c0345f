//! Offline synchronization: no review tooling, landing by local merge

use crate::helpers::*;
use anyhow::Result;
use release_sync::error::{GitError, ReleaseError};
use release_sync::sync::{BranchOrigin, LandingOutcome, TagOutcome};

#[tokio::test]
async fn test_offline_run_converges() -> Result<()> {
    let repo = TestRepo::new()?;
    let report = sync(&repo.config(), "1.3.0").await?;

    assert_eq!(report.origin, BranchOrigin::Created);
    assert!(matches!(report.tag_outcome, TagOutcome::Created(_)));
    assert!(matches!(
        report.landing,
        LandingOutcome::Offline {
            fallback_reason: None,
            ..
        }
    ));

    let main = repo.remote_commit("refs/heads/main")?;
    let release = repo.remote_commit("refs/heads/release/v1.3.0")?;
    assert_eq!(main, release);
    assert_eq!(main, report.converged_commit);

    // The tag marks the bump commit, which is on both branches.
    let tagged = repo.remote_commit("refs/tags/v1.3.0")?;
    assert_eq!(Some(tagged.as_str()), report.bump.commit.as_deref());
    repo.git(&["merge-base", "--is-ancestor", &tagged, &main])?;

    assert_eq!(repo.remote_file("main", "VERSION")?, "1.3.0");
    assert!(repo.remote_file("main", "README.md")?.contains("Current release: 1.3.0"));
    let desktop = repo.remote_file("main", "dist/editor-1.3.0.desktop")?;
    assert!(desktop.contains("Exec=editor-1.3.0.AppImage"));
    assert!(repo.remote_file("main", "dist/editor-1.2.0.desktop").is_err());

    // The caller's branch is restored.
    assert_eq!(repo.git(&["rev-parse", "--abbrev-ref", "HEAD"])?, "main");
    Ok(())
}

#[tokio::test]
async fn test_rerun_is_idempotent() -> Result<()> {
    let repo = TestRepo::new()?;
    let config = repo.config();
    let first = sync(&config, "1.3.0").await?;

    let main_before = repo.remote_ref("refs/heads/main");
    let tag_before = repo.remote_ref("refs/tags/v1.3.0");

    let second = sync(&config, "v1.3.0").await?;

    assert_eq!(second.origin, BranchOrigin::Existing);
    assert_eq!(second.bump.commit, None);
    assert_eq!(
        second.tag_outcome,
        TagOutcome::Unchanged(first.tag_outcome.commit().to_string())
    );
    assert_eq!(second.landing, LandingOutcome::AlreadyConverged);
    assert_eq!(second.convergence_rounds, 0);
    assert_eq!(second.converged_commit, first.converged_commit);

    assert_eq!(repo.remote_ref("refs/heads/main"), main_before);
    assert_eq!(repo.remote_ref("refs/tags/v1.3.0"), tag_before);
    Ok(())
}

#[tokio::test]
async fn test_conflict_resolved_in_favor_of_release() -> Result<()> {
    let repo = TestRepo::new()?;
    let config = repo.config();
    sync(&config, "1.3.0").await?;

    repo.commit_and_push("main", "NOTES.md", "integration notes\n")?;
    repo.commit_and_push("release/v1.3.0", "NOTES.md", "release notes\n")?;

    let report = sync(&config, "1.3.0").await?;

    assert_eq!(report.conflicts_resolved, vec![std::path::PathBuf::from("NOTES.md")]);
    assert_eq!(repo.remote_file("main", "NOTES.md")?, "release notes");
    assert_eq!(
        repo.remote_commit("refs/heads/main")?,
        repo.remote_commit("refs/heads/release/v1.3.0")?
    );
    Ok(())
}

#[tokio::test]
async fn test_integration_changes_survive_merge_forward() -> Result<()> {
    let repo = TestRepo::new()?;
    let config = repo.config();
    sync(&config, "1.3.0").await?;

    repo.commit_and_push("main", "CHANGELOG.md", "- fix crash on start\n")?;
    let report = sync(&config, "1.3.0").await?;

    assert!(report.conflicts_resolved.is_empty());
    assert_eq!(
        repo.remote_file("release/v1.3.0", "CHANGELOG.md")?,
        "- fix crash on start"
    );
    assert_eq!(
        repo.remote_commit("refs/heads/main")?,
        repo.remote_commit("refs/heads/release/v1.3.0")?
    );
    Ok(())
}

#[tokio::test]
async fn test_dirty_tree_rejected() -> Result<()> {
    let repo = TestRepo::new()?;
    std::fs::write(repo.work.join("README.md"), "local edits\n")?;

    let err = sync(&repo.config(), "1.3.0").await.unwrap_err();

    assert!(matches!(err, ReleaseError::Git(GitError::DirtyWorkingDirectory)));
    assert_eq!(repo.remote_ref("refs/heads/release/v1.3.0"), None);
    Ok(())
}

#[tokio::test]
async fn test_rerun_recovers_from_interrupted_merge() -> Result<()> {
    let repo = TestRepo::new()?;
    let config = repo.config();
    sync(&config, "1.3.0").await?;

    repo.commit_and_push("main", "NOTES.md", "integration notes\n")?;
    repo.commit_and_push("release/v1.3.0", "NOTES.md", "release notes\n")?;

    // A run stopped mid merge-forward leaves the conflicted merge behind.
    assert!(repo.git(&["merge", "origin/main"]).is_err());
    assert!(repo.git(&["rev-parse", "--verify", "--quiet", "MERGE_HEAD"]).is_ok());

    let report = sync(&config, "1.3.0").await?;

    assert!(repo.git(&["rev-parse", "--verify", "--quiet", "MERGE_HEAD"]).is_err());
    assert_eq!(report.conflicts_resolved, vec![std::path::PathBuf::from("NOTES.md")]);
    assert_eq!(repo.remote_file("main", "NOTES.md")?, "release notes");
    assert_eq!(
        repo.remote_commit("refs/heads/main")?,
        repo.remote_commit("refs/heads/release/v1.3.0")?
    );
    Ok(())
}
