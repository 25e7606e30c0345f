//! Landing the release branch on the integration branch.
//!
//! A review request is tried first when a backend is configured. A deferred
//! or failed review falls through to an offline merge: integration is checked
//! out detached, the release is merged in (release wins), and the result is
//! published as the new integration tip.

use super::conflict::merge_with_policy;
use super::results::LandingOutcome;
use super::{MessageTemplates, RunContext, SyncEngine};
use crate::error::{ReleaseError, Result};
use crate::git::{MergeSide, PublishTarget};
use crate::retry::retry_with_backoff;
use crate::review::{MergeDisposition, ReviewService};

enum ReviewLanding {
    Merged(u64),
    Deferred(String),
}

impl<V: ReviewService> SyncEngine<'_, V> {
    /// Land the checked-out release branch on integration
    pub(super) async fn land(&self, run: &RunContext<'_>) -> Result<LandingOutcome> {
        self.fetch().await?;
        let release_tip = self.git.head().await?;
        let integration_tip = self.require_remote_tip(&run.integration).await?;

        if self.git.is_ancestor(&release_tip, &integration_tip).await? {
            log::info!("{} is not ahead of {}; nothing to land", run.release, run.integration);
            return Ok(LandingOutcome::AlreadyConverged);
        }
        let ahead = self.git.count_commits(&integration_tip, &release_tip).await?;
        log::info!("Landing {} commit(s) from {} on {}", ahead, run.release, run.integration);

        let mut fallback_reason = None;
        if let Some(review) = self.review.filter(|_| !self.config.offline) {
            match self.land_via_review(review, run).await {
                Ok(ReviewLanding::Merged(number)) => {
                    log::info!("Landed {} through {} request #{}", run.release, review.name(), number);
                    return Ok(LandingOutcome::Review {
                        backend: review.name().to_string(),
                        number,
                    });
                }
                Ok(ReviewLanding::Deferred(reason)) => {
                    log::warn!("Review merge deferred ({}); merging offline", reason);
                    fallback_reason = Some(reason);
                }
                Err(e) => {
                    log::warn!("Review landing failed ({}); merging offline", e);
                    fallback_reason = Some(e.to_string());
                }
            }
            // The review attempt may have moved integration.
            self.fetch().await?;
        }

        let commit = self.land_offline(run).await?;
        Ok(LandingOutcome::Offline {
            commit,
            fallback_reason,
        })
    }

    async fn land_via_review(&self, review: &V, run: &RunContext<'_>) -> Result<ReviewLanding> {
        let policy = &self.config.retry;
        let (source, target) = (run.release.as_str(), run.integration.as_str());

        let existing = retry_with_backoff(policy, "find review request", |_| {
            review.find_open(source, target)
        })
        .await?;

        let request = match existing {
            Some(request) => {
                log::info!("Resuming open review request #{}", request.number);
                request
            }
            None => {
                let title = MessageTemplates::render(&self.templates.review_title, run.templates());
                let body = MessageTemplates::render(&self.templates.review_body, run.templates());
                let request = retry_with_backoff(policy, "create review request", |_| {
                    review.create(source, target, &title, &body)
                })
                .await?;
                log::info!("Opened review request #{}", request.number);
                request
            }
        };

        let disposition = retry_with_backoff(policy, "merge review request", |_| {
            review.merge(&request)
        })
        .await?;

        Ok(match disposition {
            MergeDisposition::Merged => ReviewLanding::Merged(request.number),
            MergeDisposition::Deferred { reason } => ReviewLanding::Deferred(reason),
        })
    }

    /// Merge the release branch into a detached copy of integration and
    /// publish it; returns the new integration tip
    async fn land_offline(&self, run: &RunContext<'_>) -> Result<String> {
        let release_tip = self.git.head().await?;
        let integration_tip = self.require_remote_tip(&run.integration).await?;
        let message = MessageTemplates::render(&self.templates.landing, run.templates());

        self.git.checkout_detached(&integration_tip).await?;

        let landed = async {
            merge_with_policy(self.git, &release_tip, &message, MergeSide::Theirs).await?;
            let head = self.git.head().await?;
            self.publish(&[PublishTarget::branch(&run.integration, &head)])
                .await?;
            Ok::<String, ReleaseError>(head)
        }
        .await;

        self.git.checkout(&run.release).await?;

        if let Ok(head) = &landed {
            log::info!("Landed {} on {} offline at {}", run.release, run.integration, head);
        }
        landed
    }
}
