//! Git backend driving the system `git` binary.
//!
//! Every invocation runs through [`SystemGit::exec`], which applies the
//! configured timeout, disables interactive prompts, and kills the child when
//! the future is dropped (timeout or interrupt).

use super::operations::{
    parse_ls_remote, parse_unmerged_status, ConflictEntry, MergeOutcome, RemoteBranch,
    RemoteOperations,
};
use crate::error::{GitError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Which side of an in-progress merge to take for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSide {
    /// The checked-out branch (HEAD)
    Ours,
    /// The branch being merged in
    Theirs,
}

impl MergeSide {
    fn flag(self) -> &'static str {
        match self {
            MergeSide::Ours => "--ours",
            MergeSide::Theirs => "--theirs",
        }
    }
}

/// Captured result of a git invocation
#[derive(Debug)]
struct GitOutput {
    success: bool,
    code: Option<i32>,
    stdout: Vec<u8>,
    stderr: String,
}

impl GitOutput {
    fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// Git repository accessed through the `git` executable
#[derive(Debug, Clone)]
pub struct SystemGit {
    work_tree: PathBuf,
    timeout: Duration,
}

impl SystemGit {
    /// Open the repository containing `path`
    pub async fn open(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let probe = Self {
            work_tree: path.to_path_buf(),
            timeout,
        };

        let output = probe.exec(&["rev-parse", "--show-toplevel"]).await?;
        if !output.success {
            return Err(GitError::NotRepository {
                path: path.to_path_buf(),
            }
            .into());
        }

        let top = output.stdout_text();
        log::debug!("Opened repository at {}", top);
        Ok(Self {
            work_tree: PathBuf::from(top),
            timeout,
        })
    }

    /// Root of the work tree
    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.work_tree)
            .args(["-c", "core.quotePath=false", "-c", "advice.detachedHead=false"])
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run git and capture its output; a non-zero exit is not an error here
    async fn exec(&self, args: &[&str]) -> Result<GitOutput> {
        let command_line = format!("git {}", args.join(" "));
        log::debug!("Running: {}", command_line);

        let child = self
            .command()
            .args(args)
            .spawn()
            .map_err(|e| GitError::SpawnFailed {
                command: command_line.clone(),
                reason: e.to_string(),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| GitError::SpawnFailed {
                command: command_line.clone(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                return Err(GitError::Timeout {
                    command: command_line,
                    seconds: self.timeout.as_secs(),
                }
                .into());
            }
        };

        Ok(GitOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run git and fail on a non-zero exit, returning trimmed stdout
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.exec(args).await?;
        if !output.success {
            return Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: output.stderr,
            }
            .into());
        }
        Ok(output.stdout_text())
    }

    /// Fetch URL of a remote, if configured
    pub async fn remote_url(&self, remote: &str) -> Result<Option<String>> {
        let output = self.exec(&["remote", "get-url", remote]).await?;
        Ok(output.success.then(|| output.stdout_text()).filter(|url| !url.is_empty()))
    }

    /// Commit a revision resolves to, or `None` when it does not exist
    pub async fn rev_parse(&self, rev: &str) -> Result<Option<String>> {
        let spec = format!("{}^{{commit}}", rev);
        let output = self.exec(&["rev-parse", "--verify", "--quiet", &spec]).await?;
        Ok(output.success.then(|| output.stdout_text()))
    }

    /// Object a ref points at without peeling (tag objects stay tag objects)
    pub async fn ref_object(&self, refname: &str) -> Result<Option<String>> {
        let output = self.exec(&["rev-parse", "--verify", "--quiet", refname]).await?;
        Ok(output.success.then(|| output.stdout_text()))
    }

    /// Current HEAD commit
    pub async fn head(&self) -> Result<String> {
        self.rev_parse("HEAD").await?.ok_or_else(|| {
            GitError::BranchOperationFailed {
                reason: "HEAD does not point at a commit".to_string(),
            }
            .into()
        })
    }

    /// Name of the checked-out branch, `None` when detached
    pub async fn current_branch(&self) -> Result<Option<String>> {
        let output = self.exec(&["symbolic-ref", "--quiet", "--short", "HEAD"]).await?;
        Ok(output.success.then(|| output.stdout_text()))
    }

    /// True when tracked files have no staged or unstaged changes
    pub async fn is_clean(&self) -> Result<bool> {
        let status = self
            .run(&["status", "--porcelain", "--untracked-files=no"])
            .await?;
        Ok(status.is_empty())
    }

    /// Create or reset `branch` to `start` and check it out
    pub async fn checkout_branch_at(&self, branch: &str, start: &str) -> Result<()> {
        self.run(&["checkout", "-B", branch, start])
            .await
            .map(|_| ())
            .map_err(|e| {
                GitError::BranchOperationFailed {
                    reason: format!("Failed to check out {} at {}: {}", branch, start, e),
                }
                .into()
            })
    }

    /// Check out an existing branch or revision
    pub async fn checkout(&self, rev: &str) -> Result<()> {
        self.run(&["checkout", rev]).await.map(|_| ())
    }

    /// Detach HEAD at `rev`, leaving local branches untouched
    pub async fn checkout_detached(&self, rev: &str) -> Result<()> {
        self.run(&["checkout", "--detach", rev]).await.map(|_| ())
    }

    /// Stage additions, modifications and deletions of exactly these paths
    pub async fn stage_paths(&self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let paths: Vec<String> = paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        let mut args = vec!["add", "-A", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run(&args).await.map(|_| ())
    }

    /// True when the index differs from HEAD
    pub async fn has_staged_changes(&self) -> Result<bool> {
        let output = self.exec(&["diff", "--cached", "--quiet"]).await?;
        match output.code {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(GitError::CommandFailed {
                command: "git diff --cached --quiet".to_string(),
                stderr: output.stderr,
            }
            .into()),
        }
    }

    /// Commit the index and return the new HEAD
    pub async fn commit(&self, message: &str) -> Result<String> {
        self.run(&["commit", "--no-verify", "--quiet", "-m", message])
            .await?;
        self.head().await
    }

    /// Create (or move, with `force`) an annotated tag
    pub async fn create_tag(&self, name: &str, message: &str, target: &str, force: bool) -> Result<()> {
        let mut args = vec!["tag", "-a"];
        if force {
            args.push("-f");
        }
        args.extend(["-m", message, name, target]);
        self.run(&args).await.map(|_| ())
    }

    /// Commit a local tag points at, peeled
    pub async fn tag_commit(&self, name: &str) -> Result<Option<String>> {
        self.rev_parse(&format!("refs/tags/{}", name)).await
    }

    /// Merge `rev` into HEAD, fast-forwarding when possible.
    ///
    /// On conflicts the merge is left in progress and the unmerged paths are
    /// returned; the caller resolves them and calls [`Self::commit_merge`].
    pub async fn merge(&self, rev: &str, message: &str) -> Result<MergeOutcome> {
        let target = self.rev_parse(rev).await?.ok_or_else(|| GitError::MergeFailed {
            reason: format!("unknown revision '{}'", rev),
        })?;
        let head = self.head().await?;

        if self.is_ancestor(&target, &head).await? {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }

        let output = self
            .exec(&["merge", "--ff", "--no-edit", "-m", message, &target])
            .await?;

        if output.success {
            let new_head = self.head().await?;
            return Ok(if new_head == target {
                MergeOutcome::FastForward(new_head)
            } else {
                MergeOutcome::MergeCommit(new_head)
            });
        }

        let conflicts = self.unmerged_entries().await?;
        if conflicts.is_empty() {
            // Refused before starting (e.g. local changes would be overwritten)
            return Err(GitError::MergeFailed {
                reason: output.stderr,
            }
            .into());
        }

        Ok(MergeOutcome::Conflicted(conflicts))
    }

    /// Unmerged paths of the in-progress merge
    pub async fn unmerged_entries(&self) -> Result<Vec<ConflictEntry>> {
        let output = self
            .exec(&["status", "--porcelain=v1", "-z", "--untracked-files=no"])
            .await?;
        if !output.success {
            return Err(GitError::CommandFailed {
                command: "git status --porcelain=v1 -z".to_string(),
                stderr: output.stderr,
            }
            .into());
        }
        Ok(parse_unmerged_status(&output.stdout))
    }

    /// Resolve a conflicted path by taking one side's content
    pub async fn take_side(&self, path: &Path, side: MergeSide) -> Result<()> {
        let path = path.to_string_lossy();
        self.run(&["checkout", side.flag(), "--", &path]).await?;
        self.run(&["add", "--", &path]).await.map(|_| ())
    }

    /// Resolve a conflicted path by deleting it
    pub async fn remove_path(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.run(&["rm", "--quiet", "--force", "--ignore-unmatch", "--", &path])
            .await
            .map(|_| ())
    }

    /// Conclude an in-progress merge whose conflicts are resolved
    pub async fn commit_merge(&self, message: &str) -> Result<String> {
        self.commit(message).await
    }

    /// Whether a merge is stopped mid-way (`MERGE_HEAD` exists)
    pub async fn merge_in_progress(&self) -> Result<bool> {
        Ok(self.rev_parse("MERGE_HEAD").await?.is_some())
    }

    /// Abandon an in-progress merge
    pub async fn abort_merge(&self) -> Result<()> {
        self.run(&["merge", "--abort"]).await.map(|_| ())
    }

    /// True when `ancestor` is reachable from `descendant`
    pub async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let output = self
            .exec(&["merge-base", "--is-ancestor", ancestor, descendant])
            .await?;
        match output.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitError::CommandFailed {
                command: format!("git merge-base --is-ancestor {} {}", ancestor, descendant),
                stderr: output.stderr,
            }
            .into()),
        }
    }

    /// Number of commits reachable from `to` but not from `from`
    pub async fn count_commits(&self, from: &str, to: &str) -> Result<u64> {
        let range = format!("{}..{}", from, to);
        let count = self.run(&["rev-list", "--count", &range]).await?;
        count.parse::<u64>().map_err(|e| {
            GitError::CommandFailed {
                command: format!("git rev-list --count {}", range),
                stderr: format!("unexpected output '{}': {}", count, e),
            }
            .into()
        })
    }

    /// Paths tracked in the index, relative to the work tree
    pub async fn tracked_files(&self) -> Result<Vec<PathBuf>> {
        let output = self.exec(&["ls-files", "-z"]).await?;
        if !output.success {
            return Err(GitError::CommandFailed {
                command: "git ls-files -z".to_string(),
                stderr: output.stderr,
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    /// Most recent `v<semver>` tag reachable from HEAD
    pub async fn latest_version_tag(&self) -> Result<Option<String>> {
        let output = self
            .exec(&["describe", "--tags", "--abbrev=0", "--match", "v[0-9]*"])
            .await?;
        Ok(output.success.then(|| output.stdout_text()).filter(|t| !t.is_empty()))
    }

    /// Remote-tracking branches under `prefix`, newest first by creator date
    pub async fn remote_branches(&self, remote: &str, prefix: &str) -> Result<Vec<RemoteBranch>> {
        let namespace = format!("refs/remotes/{}/", remote);
        let pattern = format!("{}{}", namespace, prefix.trim_end_matches('/'));
        let listing = self
            .run(&[
                "for-each-ref",
                "--sort=-creatordate",
                "--format=%(refname)%09%(creatordate:unix)",
                &pattern,
            ])
            .await?;

        let branches = listing
            .lines()
            .filter_map(|line| {
                let mut fields = line.split('\t');
                let refname = fields.next()?;
                let seconds = fields.next()?.trim().parse::<i64>().ok()?;
                Some(RemoteBranch {
                    name: refname.strip_prefix(&namespace)?.to_string(),
                    created_at: chrono::DateTime::from_timestamp(seconds, 0)?,
                })
            })
            .collect();

        Ok(branches)
    }
}

impl RemoteOperations for SystemGit {
    async fn fetch(&self, remote: &str) -> Result<()> {
        // Pruning stays separate from the tag fetch so local-only tags survive.
        self.run(&["fetch", "--prune", remote]).await?;
        self.run(&["fetch", "--tags", "--force", remote])
            .await
            .map(|_| ())
    }

    async fn push(&self, remote: &str, refspecs: &[String]) -> Result<()> {
        let mut args = vec!["push", "--porcelain", remote];
        args.extend(refspecs.iter().map(String::as_str));
        self.run(&args).await.map(|_| ())
    }

    async fn remote_ref_tip(&self, remote: &str, refname: &str) -> Result<Option<String>> {
        let listing = self.run(&["ls-remote", remote, refname]).await?;
        Ok(parse_ls_remote(&listing, refname))
    }

    async fn delete_remote_branch(&self, remote: &str, branch: &str) -> Result<()> {
        self.run(&["push", remote, "--delete", branch])
            .await
            .map(|_| ())
    }
}
