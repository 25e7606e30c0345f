//! Retention pruning of old release branches

use crate::helpers::*;
use anyhow::Result;
use release_sync::SyncConfig;

/// Push old release branches whose tips were committed on distinct dates.
/// Creation order (1.0.0, 1.2.0, 1.1.0) differs from version order.
fn seed_old_releases(repo: &TestRepo) -> Result<()> {
    let base = repo.git(&["rev-parse", "HEAD"])?;
    let tree = format!("{}^{{tree}}", base);
    let seeds = [
        ("1.0.0", "1735689600 +0000"),
        ("1.2.0", "1738368000 +0000"),
        ("1.1.0", "1740787200 +0000"),
    ];

    for (version, date) in seeds {
        let message = format!("Release {}", version);
        let tip = git_with_env(
            &repo.work,
            &["commit-tree", "-p", &base, "-m", &message, &tree],
            &[("GIT_COMMITTER_DATE", date), ("GIT_AUTHOR_DATE", date)],
        )?;
        repo.git(&[
            "push",
            "origin",
            &format!("{}:refs/heads/release/v{}", tip, version),
        ])?;
    }
    Ok(())
}

#[tokio::test]
async fn test_keeps_newest_releases() -> Result<()> {
    let repo = TestRepo::new()?;
    seed_old_releases(&repo)?;
    let config = SyncConfig {
        keep_releases: 2,
        ..repo.config()
    };

    let report = sync(&config, "1.3.0").await?;

    // v1.1.0 was created after v1.2.0, so it is the one kept.
    assert_eq!(
        report.retention.kept,
        vec!["release/v1.3.0".to_string(), "release/v1.1.0".to_string()]
    );
    let mut deleted = report.retention.deleted.clone();
    deleted.sort();
    assert_eq!(deleted, vec!["release/v1.0.0", "release/v1.2.0"]);
    assert!(report.retention.failed.is_empty());

    assert_eq!(
        repo.remote_release_branches()?,
        vec!["release/v1.1.0", "release/v1.3.0"]
    );
    Ok(())
}

#[tokio::test]
async fn test_keep_zero_disables_pruning() -> Result<()> {
    let repo = TestRepo::new()?;
    seed_old_releases(&repo)?;
    let config = SyncConfig {
        keep_releases: 0,
        ..repo.config()
    };

    let report = sync(&config, "1.3.0").await?;

    assert!(report.retention.disabled);
    assert_eq!(repo.remote_release_branches()?.len(), 4);
    Ok(())
}
