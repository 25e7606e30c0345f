//! Git access for release synchronization.
//!
//! Local repository work goes through [`SystemGit`]; every remote mutation
//! goes through the [`RetryVerifiedPublisher`], which only trusts what the
//! remote reports back.

mod operations;
mod publisher;
mod system_git;

pub use operations::{
    parse_ls_remote, parse_unmerged_status, ConflictEntry, ConflictKind, MergeOutcome,
    RemoteBranch, RemoteOperations,
};
pub use publisher::{PublishTarget, PushReport, RetryVerifiedPublisher};
pub use system_git::{MergeSide, SystemGit};
