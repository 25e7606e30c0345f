//! Retry-verified publishing of refs to a remote.
//!
//! A push counts as landed only when the remote reports the expected object
//! for every ref. Whatever the push command itself said is logged and then
//! ignored: a dropped connection after the remote accepted the update is a
//! success, and a "successful" push that left the remote elsewhere is not.

use super::operations::RemoteOperations;
use crate::error::{ReleaseError, Result, SyncError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use std::cell::Cell;

/// One ref to publish and the object the remote must end up showing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    /// Full remote ref name (`refs/heads/main`, `refs/tags/v1.3.0`)
    pub remote_ref: String,
    /// Object id expected at the remote ref after the push
    pub expected: String,
    /// Whether the remote ref may be moved non-fast-forward
    pub force: bool,
}

impl PublishTarget {
    /// A branch that must fast-forward to `commit`
    pub fn branch(name: &str, commit: &str) -> Self {
        Self {
            remote_ref: format!("refs/heads/{}", name),
            expected: commit.to_string(),
            force: false,
        }
    }

    /// A tag that is force-updated to `object` (the tag object for annotated tags)
    pub fn tag(name: &str, object: &str) -> Self {
        Self {
            remote_ref: format!("refs/tags/{}", name),
            expected: object.to_string(),
            force: true,
        }
    }

    /// Refspec pushing the expected object straight to the remote ref
    pub fn refspec(&self) -> String {
        format!(
            "{}{}:{}",
            if self.force { "+" } else { "" },
            self.expected,
            self.remote_ref
        )
    }
}

/// Outcome of a verified publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// `(remote ref, observed object)` for every published ref
    pub observed: Vec<(String, String)>,
}

/// Publishes refs with bounded retries, verifying the remote after each attempt
#[derive(Debug)]
pub struct RetryVerifiedPublisher<'a, R: RemoteOperations> {
    remote: &'a R,
    remote_name: &'a str,
    policy: &'a RetryPolicy,
}

impl<'a, R: RemoteOperations> RetryVerifiedPublisher<'a, R> {
    /// Create a publisher for `remote_name`
    pub fn new(remote: &'a R, remote_name: &'a str, policy: &'a RetryPolicy) -> Self {
        Self {
            remote,
            remote_name,
            policy,
        }
    }

    /// Push all targets in one command and verify every remote tip
    pub async fn publish(&self, targets: &[PublishTarget]) -> Result<PushReport> {
        let refspecs: Vec<String> = targets.iter().map(PublishTarget::refspec).collect();
        let label = targets
            .iter()
            .map(|t| t.remote_ref.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let attempts = Cell::new(0);

        log::info!("Publishing {} to {}", label, self.remote_name);

        let result = retry_with_backoff(self.policy, &format!("push {}", label), |attempt| {
            attempts.set(attempt);
            let refspecs = &refspecs;
            async move {
                if let Err(e) = self.remote.push(self.remote_name, refspecs).await {
                    log::warn!("Push attempt {} reported: {}", attempt, e);
                }
                self.verify(targets).await
            }
        })
        .await;

        match result {
            Ok(observed) => Ok(PushReport {
                attempts: attempts.get(),
                observed,
            }),
            Err(e) => Err(self.exhausted(e, label)),
        }
    }

    /// Delete a remote branch and confirm it is gone
    pub async fn delete_branch(&self, branch: &str) -> Result<u32> {
        let remote_ref = format!("refs/heads/{}", branch);
        let attempts = Cell::new(0);

        let result = retry_with_backoff(self.policy, &format!("delete {}", remote_ref), |attempt| {
            attempts.set(attempt);
            let remote_ref = &remote_ref;
            async move {
                if let Err(e) = self.remote.delete_remote_branch(self.remote_name, branch).await {
                    log::warn!("Delete attempt {} reported: {}", attempt, e);
                }
                match self.remote.remote_ref_tip(self.remote_name, remote_ref).await? {
                    None => Ok(()),
                    Some(observed) => Err(ReleaseError::from(SyncError::PushUnverified {
                        remote: self.remote_name.to_string(),
                        refname: remote_ref.clone(),
                        expected: "(deleted)".to_string(),
                        observed: Some(observed),
                    })),
                }
            }
        })
        .await;

        match result {
            Ok(()) => Ok(attempts.get()),
            Err(e) => Err(self.exhausted(e, remote_ref)),
        }
    }

    async fn verify(&self, targets: &[PublishTarget]) -> Result<Vec<(String, String)>> {
        let mut observed = Vec::with_capacity(targets.len());

        for target in targets {
            let tip = self
                .remote
                .remote_ref_tip(self.remote_name, &target.remote_ref)
                .await?;

            if tip.as_deref() != Some(target.expected.as_str()) {
                return Err(SyncError::PushUnverified {
                    remote: self.remote_name.to_string(),
                    refname: target.remote_ref.clone(),
                    expected: target.expected.clone(),
                    observed: tip,
                }
                .into());
            }

            observed.push((target.remote_ref.clone(), target.expected.clone()));
        }

        Ok(observed)
    }

    fn exhausted(&self, error: ReleaseError, refs: String) -> ReleaseError {
        match error {
            ReleaseError::Sync(SyncError::RetryExhausted {
                attempts,
                last_error,
                ..
            }) => SyncError::PushExhausted {
                remote: self.remote_name.to_string(),
                refs,
                attempts,
                last_error,
            }
            .into(),
            other => other,
        }
    }
}
