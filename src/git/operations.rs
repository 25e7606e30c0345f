//! Remote operations trait and shared git types.
//!
//! The publisher and the sync engine talk to the remote only through
//! [`RemoteOperations`], so the retry and verification logic can run against
//! any backend.

use crate::error::Result;
use std::future::Future;
use std::path::PathBuf;

/// Operations that read or mutate remote state
pub trait RemoteOperations {
    /// Fetch branches and tags from the remote, pruning deleted branches
    fn fetch(&self, remote: &str) -> impl Future<Output = Result<()>>;

    /// Push refspecs to the remote
    fn push(&self, remote: &str, refspecs: &[String]) -> impl Future<Output = Result<()>>;

    /// Object id a remote ref currently points at (annotated tags are not peeled)
    fn remote_ref_tip(
        &self,
        remote: &str,
        refname: &str,
    ) -> impl Future<Output = Result<Option<String>>>;

    /// Delete a branch on the remote
    fn delete_remote_branch(&self, remote: &str, branch: &str) -> impl Future<Output = Result<()>>;
}

/// Outcome of a local merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing to merge
    AlreadyUpToDate,
    /// HEAD moved to the merged commit
    FastForward(String),
    /// A merge commit was created
    MergeCommit(String),
    /// The merge stopped on conflicts and is still in progress
    Conflicted(Vec<ConflictEntry>),
}

/// Unmerged path state, from the two-letter porcelain status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// `DD`
    BothDeleted,
    /// `AU`
    AddedByUs,
    /// `UD`
    DeletedByThem,
    /// `UA`
    AddedByThem,
    /// `DU`
    DeletedByUs,
    /// `AA`
    BothAdded,
    /// `UU`
    BothModified,
}

impl ConflictKind {
    /// Parse a porcelain v1 status code
    pub fn from_status(code: &str) -> Option<Self> {
        match code {
            "DD" => Some(Self::BothDeleted),
            "AU" => Some(Self::AddedByUs),
            "UD" => Some(Self::DeletedByThem),
            "UA" => Some(Self::AddedByThem),
            "DU" => Some(Self::DeletedByUs),
            "AA" => Some(Self::BothAdded),
            "UU" => Some(Self::BothModified),
            _ => None,
        }
    }

    /// Whether our side (HEAD) still has content at this path
    pub fn ours_has_content(self) -> bool {
        matches!(
            self,
            Self::AddedByUs | Self::DeletedByThem | Self::BothAdded | Self::BothModified
        )
    }

    /// Whether their side (the merged ref) still has content at this path
    pub fn theirs_has_content(self) -> bool {
        matches!(
            self,
            Self::AddedByThem | Self::DeletedByUs | Self::BothAdded | Self::BothModified
        )
    }
}

/// One conflicting path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEntry {
    /// Path relative to the work tree
    pub path: PathBuf,
    /// How the two sides disagree
    pub kind: ConflictKind,
}

/// A release branch seen on the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBranch {
    /// Branch name without the remote prefix (`release/v1.3.0`)
    pub name: String,
    /// Creation time used for ordering (committer date of the tip)
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Parse `git status --porcelain=v1 -z` output into unmerged entries
pub fn parse_unmerged_status(raw: &[u8]) -> Vec<ConflictEntry> {
    let text = String::from_utf8_lossy(raw);
    let mut entries = Vec::new();
    let mut records = text.split('\0').filter(|r| !r.is_empty());

    while let Some(record) = records.next() {
        if record.len() < 4 {
            continue;
        }
        let (code, path) = record.split_at(2);
        let path = &path[1..];

        // Renames and copies carry the source path as an extra record.
        if code.starts_with('R') || code.starts_with('C') {
            records.next();
        }

        if let Some(kind) = ConflictKind::from_status(code) {
            entries.push(ConflictEntry {
                path: PathBuf::from(path),
                kind,
            });
        }
    }

    entries
}

/// Parse `git ls-remote` output for the exact ref, ignoring peeled `^{}` lines
pub fn parse_ls_remote(output: &str, refname: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(sha), Some(name)) if name == refname => Some(sha.to_string()),
            _ => None,
        }
    })
}
