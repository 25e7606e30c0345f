//! Tests for the `release-sync` binary

use crate::helpers::*;
use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use release_sync::lock::LockManager;

fn release_sync(repo: &TestRepo) -> Result<Command> {
    let mut cmd = Command::cargo_bin("release-sync")?;
    cmd.arg("--repo")
        .arg(&repo.work)
        .arg("--lock-dir")
        .arg(&repo.lock_dir)
        .arg("--backoff-secs")
        .arg("0")
        .env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn test_missing_version_is_usage_error() -> Result<()> {
    Command::cargo_bin("release-sync")?
        .assert()
        .code(2)
        .stderr(predicate::str::contains("VERSION"));
    Ok(())
}

#[test]
fn test_invalid_version_fails() -> Result<()> {
    let repo = TestRepo::new()?;
    release_sync(&repo)?
        .args(["not-a-version", "--offline"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("version"));

    assert_eq!(repo.remote_ref("refs/heads/release/vnot-a-version"), None);
    Ok(())
}

#[test]
fn test_offline_run_succeeds() -> Result<()> {
    let repo = TestRepo::new()?;
    release_sync(&repo)?
        .args(["1.3.0", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("converged"));

    assert_eq!(
        repo.remote_commit("refs/heads/main")?,
        repo.remote_commit("refs/heads/release/v1.3.0")?
    );
    Ok(())
}

#[test]
fn test_second_instance_rejected_while_locked() -> Result<()> {
    let repo = TestRepo::new()?;
    let repo_id = repo.git(&["remote", "get-url", "origin"])?;
    let _held = LockManager::new(repo.lock_dir.clone()).acquire(&repo_id)?;

    release_sync(&repo)?
        .args(["1.3.0", "--offline"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already running"));

    assert_eq!(repo.remote_ref("refs/heads/release/v1.3.0"), None);
    Ok(())
}
