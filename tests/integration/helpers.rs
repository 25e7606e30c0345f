//! Test helpers for integration tests

use anyhow::{bail, Context, Result};
use release_sync::retry::RetryPolicy;
use release_sync::{ReleaseVersion, ReviewBackend, ReviewService, SyncConfig, SyncEngine, SyncReport, SystemGit};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

/// A bare "remote" plus a working clone seeded with release 1.2.0
pub struct TestRepo {
    _root: TempDir,
    pub remote: PathBuf,
    pub work: PathBuf,
    pub lock_dir: PathBuf,
}

impl TestRepo {
    /// Create the remote and a clone holding VERSION, README.md and a
    /// version-stamped desktop file, tagged `v1.2.0` and pushed
    pub fn new() -> Result<Self> {
        let root = TempDir::new()?;
        let remote = root.path().join("remote.git");
        let work = root.path().join("work");
        let lock_dir = root.path().join("locks");
        std::fs::create_dir_all(&work)?;
        std::fs::create_dir_all(&lock_dir)?;

        git(root.path(), &["init", "--bare", "--initial-branch=main", &path_str(&remote)])?;

        git(&work, &["init", "--initial-branch=main"])?;
        configure_identity(&work)?;
        git(&work, &["remote", "add", "origin", &path_str(&remote)])?;

        std::fs::write(work.join("VERSION"), "1.2.0\n")?;
        std::fs::write(work.join("README.md"), "# Editor\n\nCurrent release: 1.2.0\n")?;
        std::fs::create_dir_all(work.join("dist"))?;
        std::fs::write(
            work.join("dist/editor-1.2.0.desktop"),
            "[Desktop Entry]\nName=Editor\nExec=editor-1.2.0.AppImage\n",
        )?;
        git(&work, &["add", "."])?;
        git(&work, &["commit", "-m", "Initial release"])?;
        git(&work, &["tag", "-a", "v1.2.0", "-m", "Release v1.2.0"])?;
        git(&work, &["push", "-u", "origin", "main"])?;
        git(&work, &["push", "origin", "v1.2.0"])?;

        Ok(Self {
            _root: root,
            remote,
            work,
            lock_dir,
        })
    }

    /// Offline configuration with fast retries
    pub fn config(&self) -> SyncConfig {
        SyncConfig {
            repo_path: self.work.clone(),
            keep_releases: 5,
            retry: RetryPolicy::new(2, Duration::ZERO),
            command_timeout: Duration::from_secs(60),
            offline: true,
            lock_dir: self.lock_dir.clone(),
            ..SyncConfig::default()
        }
    }

    /// Run git in the working clone and return trimmed stdout
    pub fn git(&self, args: &[&str]) -> Result<String> {
        git(&self.work, args)
    }

    /// Object a ref points at on the remote, without peeling
    pub fn remote_ref(&self, refname: &str) -> Option<String> {
        git_dir(&self.remote, &["rev-parse", "--verify", "--quiet", refname]).ok()
    }

    /// Commit a tag or branch resolves to on the remote
    pub fn remote_commit(&self, rev: &str) -> Result<String> {
        git_dir(&self.remote, &["rev-parse", "--verify", &format!("{}^{{commit}}", rev)])
    }

    /// File contents at `rev:path` on the remote
    pub fn remote_file(&self, rev: &str, path: &str) -> Result<String> {
        git_dir(&self.remote, &["show", &format!("{}:{}", rev, path)])
    }

    /// Release branches present on the remote, sorted by name
    pub fn remote_release_branches(&self) -> Result<Vec<String>> {
        let listing = git_dir(
            &self.remote,
            &["for-each-ref", "--format=%(refname:strip=2)", "refs/heads/release/"],
        )?;
        let mut branches: Vec<String> = listing.lines().map(String::from).collect();
        branches.sort();
        Ok(branches)
    }

    /// Commit a file on `branch` (created from the remote if needed) and push it
    pub fn commit_and_push(&self, branch: &str, file: &str, contents: &str) -> Result<String> {
        self.git(&["fetch", "origin"])?;
        self.git(&["checkout", "-B", branch, &format!("origin/{}", branch)])?;
        std::fs::write(self.work.join(file), contents)?;
        self.git(&["add", file])?;
        self.git(&["commit", "-m", &format!("Update {} on {}", file, branch)])?;
        self.git(&["push", "origin", branch])?;
        self.git(&["rev-parse", "HEAD"])
    }
}

/// Drive one synchronization through the engine, without review tooling
pub async fn sync(config: &SyncConfig, version: &str) -> release_sync::Result<SyncReport> {
    sync_with(config, version, None::<&ReviewBackend>).await
}

/// Drive one synchronization with an explicit review service
pub async fn sync_with<V: ReviewService>(
    config: &SyncConfig,
    version: &str,
    review: Option<&V>,
) -> release_sync::Result<SyncReport> {
    let version = ReleaseVersion::parse(version)?;
    let git = SystemGit::open(&config.repo_path, config.command_timeout).await?;
    SyncEngine::new(&git, config, review).run(&version).await
}

/// Give a repository a committer identity and disable signing
pub fn configure_identity(dir: &Path) -> Result<()> {
    git(dir, &["config", "user.name", "Test User"])?;
    git(dir, &["config", "user.email", "test@example.com"])?;
    git(dir, &["config", "commit.gpgsign", "false"])?;
    git(dir, &["config", "tag.gpgsign", "false"])?;
    Ok(())
}

/// Run git in `dir`, failing on a nonzero exit
pub fn git(dir: &Path, args: &[&str]) -> Result<String> {
    git_with_env(dir, args, &[])
}

/// Run git in `dir` with extra environment variables
pub fn git_with_env(dir: &Path, args: &[&str], env: &[(&str, &str)]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .envs(env.iter().copied())
        .output()
        .with_context(|| format!("failed to spawn git {}", args.join(" ")))?;

    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn git_dir(git_dir: &Path, args: &[&str]) -> Result<String> {
    let mut full = vec!["--git-dir".to_string(), path_str(git_dir)];
    full.extend(args.iter().map(|a| a.to_string()));
    let full: Vec<&str> = full.iter().map(String::as_str).collect();
    git(git_dir, &full)
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
