//! The synchronization command.

use super::EXIT_INTERRUPTED;
use crate::cli::{Args, RuntimeConfig};
use crate::error::{ReleaseError, Result, SyncError};
use crate::git::SystemGit;
use crate::lock::LockManager;
use crate::review::{self, ReviewBackend, ReviewService};
use crate::sync::{
    repository_identity, BranchOrigin, LandingOutcome, SyncEngine, SyncReport, TagOutcome,
};
use crate::version::ReleaseVersion;
use crate::SyncConfig;

/// Run one synchronization and report it; returns the process exit code
pub(super) async fn execute_sync(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    match synchronize(args, config).await {
        Ok(report) => {
            print_summary(&report, config);
            Ok(0)
        }
        Err(e) => {
            report_failure(&e, config);
            Ok(match e {
                ReleaseError::Sync(SyncError::Interrupted) => EXIT_INTERRUPTED,
                _ => 1,
            })
        }
    }
}

async fn synchronize(args: &Args, config: &RuntimeConfig) -> Result<SyncReport> {
    let version = ReleaseVersion::parse(&args.version)?;
    let sync_config = SyncConfig::resolve(args);

    let git = SystemGit::open(&sync_config.repo_path, sync_config.command_timeout).await?;
    config.verbose_println(&format!("Repository: {}", git.work_tree().display()));

    let repo_id = repository_identity(&git, &sync_config.remote).await?;
    let mut lock = LockManager::new(sync_config.lock_dir.clone()).acquire(&repo_id)?;
    config.verbose_println(&format!("Holding lock {}", lock.path().display()));

    let backend = if sync_config.offline {
        config.verbose_println("Offline mode: review tooling skipped");
        None
    } else {
        let token =
            review::resolve_token(sync_config.token.as_deref(), sync_config.command_timeout).await;
        let remote_url = git.remote_url(&sync_config.remote).await?;
        review::detect(remote_url.as_deref(), token.as_deref(), sync_config.command_timeout).await
    };

    match &backend {
        Some(backend) => config.verbose_println(&format!("Review backend: {}", backend.name())),
        None if !sync_config.offline => {
            config.warning_println("No usable review tooling; the release will land offline")
        }
        None => {}
    }

    config.progress_println(&format!(
        "Synchronizing {} into {} on {}",
        version.release_branch(),
        sync_config.integration_branch,
        sync_config.remote
    ));

    let engine = SyncEngine::<ReviewBackend>::new(&git, &sync_config, backend.as_ref());
    let result = tokio::select! {
        result = engine.run(&version) => result,
        Ok(()) = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted during {}", engine.phase());
            Err(SyncError::Interrupted.into())
        }
    };

    if let Err(e) = lock.release() {
        log::warn!("Failed to release lock: {}", e);
    }
    result
}

fn print_summary(report: &SyncReport, config: &RuntimeConfig) {
    let output = config.output();
    config.success_println(&format!(
        "{} and {} converged",
        report.release_branch, report.integration_branch
    ));
    let _ = output.section("Release summary");

    let _ = output.field("Version", report.version.as_str());
    let _ = output.field("Commit", &report.converged_commit);

    let origin = match report.origin {
        BranchOrigin::Created => "created",
        BranchOrigin::Existing => "existing",
    };
    let _ = output.field("Branch", &format!("{} ({})", report.release_branch, origin));

    let bump = match (&report.bump.old_version, &report.bump.commit) {
        (_, None) => "no changes".to_string(),
        (Some(old), Some(commit)) => format!("{} -> {} at {}", old, report.version, short(commit)),
        (None, Some(commit)) => format!("marker written at {}", short(commit)),
    };
    let _ = output.field("Bump", &bump);

    let tag = match &report.tag_outcome {
        TagOutcome::Created(commit) => format!("{} created at {}", report.tag, short(commit)),
        TagOutcome::Moved { from, to } => {
            format!("{} moved {} -> {}", report.tag, short(from), short(to))
        }
        TagOutcome::Unchanged(commit) => format!("{} unchanged at {}", report.tag, short(commit)),
    };
    let _ = output.field("Tag", &tag);

    let landing = match &report.landing {
        LandingOutcome::AlreadyConverged => "already on integration".to_string(),
        LandingOutcome::Review { backend, number } => format!("review request #{} ({})", number, backend),
        LandingOutcome::Offline {
            fallback_reason: Some(reason),
            ..
        } => format!("offline merge (review fallback: {})", reason),
        LandingOutcome::Offline { .. } => "offline merge".to_string(),
    };
    let _ = output.field("Landing", &landing);

    if !report.conflicts_resolved.is_empty() {
        let _ = output.field(
            "Conflicts",
            &format!("{} resolved in favor of the release", report.conflicts_resolved.len()),
        );
        for path in &report.conflicts_resolved {
            config.indent(&path.display().to_string());
        }
    }

    let retention = &report.retention;
    let pruning = if retention.disabled {
        "disabled".to_string()
    } else {
        format!(
            "kept {}, deleted {}, failed {}",
            retention.kept.len(),
            retention.deleted.len(),
            retention.failed.len()
        )
    };
    let _ = output.field("Retention", &pruning);
    for (branch, reason) in &retention.failed {
        config.warning_println(&format!("Could not prune {}: {}", branch, reason));
    }

    config.verbose_println(&format!(
        "{} push attempt(s), {} convergence round(s)",
        report.push_attempts, report.convergence_rounds
    ));
}

fn report_failure(error: &ReleaseError, config: &RuntimeConfig) {
    config.error_println(&format!("Release sync failed during {}: {}", error.stage(), error));

    let suggestions = error.recovery_suggestions();
    if !suggestions.is_empty() {
        // Shown even in quiet mode
        let output = crate::cli::OutputManager::new(false, false);
        let _ = output.println("\n💡 Recovery suggestions:");
        for suggestion in suggestions {
            let _ = output.indent(&suggestion);
        }
    }
}

fn short(commit: &str) -> &str {
    commit.get(..10).unwrap_or(commit)
}
