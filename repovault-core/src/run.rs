//! Run orchestrator: drives one backup run end to end.
//!
//! Stages advance linearly: Discovering → Processing → Uploading →
//! CleaningUp → Notifying → Done. Only a discovery failure terminates early;
//! every per-repository or per-destination failure is absorbed into records
//! and results so the manifest stays a complete account of what was
//! attempted. In execute mode a notification is sent on every path, including
//! the discovery-failure path, before the error is returned.
//!
//! Dry run performs no mutating action: no directories, no manifest file, no
//! uploads, no deletion, no notification. It produces the same planned
//! records the execute path would, using the same naming source.

use std::fmt;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::context::RunContext;
use crate::contract::{
    Archiver, DiscoveryError, Notifier, Project, RemoteStore, Repository, SourceProvider,
};
use crate::discover;
use crate::manifest::{BackupRecord, Manifest, ManifestBuilder};
use crate::notify::RunSummary;
use crate::upload;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    ManifestState(#[from] crate::manifest::InvalidStateError),
    #[error("manifest could not be serialised: {0}")]
    Serialise(#[from] serde_json::Error),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Discovering,
    Processing,
    Uploading,
    CleaningUp,
    Notifying,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discovering => "discovering",
            Stage::Processing => "processing",
            Stage::Uploading => "uploading",
            Stage::CleaningUp => "cleaning-up",
            Stage::Notifying => "notifying",
            Stage::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Outcome of a completed run: the audit manifest and the operator summary.
#[derive(Debug)]
pub struct RunReport {
    pub manifest: Manifest,
    pub summary: RunSummary,
}

/// Execute one full backup run.
pub async fn run<P, A, N>(
    ctx: &RunContext,
    provider: &P,
    archiver: &A,
    destinations: &[Box<dyn RemoteStore>],
    notifier: &N,
) -> Result<RunReport, RunError>
where
    P: SourceProvider + ?Sized,
    A: Archiver + ?Sized,
    N: Notifier + ?Sized,
{
    info!(
        stage = %Stage::Discovering,
        organization = %ctx.organization,
        dry_run = ctx.dry_run,
        "Starting backup run"
    );
    let discovered = match discover::discover(ctx, provider).await {
        Ok(discovered) => discovered,
        Err(e) => {
            error!(error = %e, "Discovery failed; aborting run before any work");
            let summary = RunSummary::discovery_failure(ctx, &e);
            let manifest = ManifestBuilder::new(ctx).finalize();
            if !ctx.dry_run {
                best_effort_notify(notifier, &summary, &manifest).await;
            }
            return Err(RunError::Discovery(e));
        }
    };

    // Flatten to (arrival index, project, repo); the index restores discovery
    // order after the unordered worker pool completes.
    let pairs: Vec<(usize, Project, Repository)> = discovered
        .into_iter()
        .flat_map(|(project, repos)| {
            repos.into_iter().map(move |repo| (project.clone(), repo))
        })
        .enumerate()
        .map(|(idx, (project, repo))| (idx, project, repo))
        .collect();

    info!(
        stage = %Stage::Processing,
        repos = pairs.len(),
        workers = ctx.workers,
        "Processing repositories"
    );
    let records: Vec<BackupRecord> = if ctx.dry_run {
        pairs
            .iter()
            .map(|(_, project, repo)| BackupRecord::planned(ctx, &project.name, &repo.name))
            .collect()
    } else {
        tokio::fs::create_dir_all(ctx.run_root()).await?;
        let mut indexed: Vec<(usize, BackupRecord)> = stream::iter(pairs)
            .map(|(idx, project, repo)| async move {
                (idx, archiver.build(ctx, &project, &repo).await)
            })
            .buffer_unordered(ctx.workers.max(1))
            .collect()
            .await;
        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, record)| record).collect()
    };

    let mut builder = ManifestBuilder::new(ctx);
    for record in records {
        builder.append(record)?;
    }
    let manifest = builder.finalize();

    if !ctx.dry_run {
        let manifest_path = ctx.manifest_path();
        tokio::fs::create_dir_all(&ctx.backups_root).await?;
        tokio::fs::write(&manifest_path, manifest.to_json_pretty()?).await?;
        info!(path = %manifest_path.display(), "Backup manifest written");
    }

    let upload_results = if ctx.dry_run {
        info!(stage = %Stage::Uploading, "Dry run: skipping upload");
        Vec::new()
    } else {
        info!(
            stage = %Stage::Uploading,
            destinations = destinations.len(),
            "Dispatching uploads"
        );
        upload::dispatch(ctx, destinations).await
    };

    if !ctx.dry_run {
        info!(stage = %Stage::CleaningUp, "Evaluating local cleanup");
        clean_up(ctx, &upload_results).await;
    }

    let summary = RunSummary::from_manifest(ctx, &manifest, upload_results);
    if ctx.dry_run {
        info!(stage = %Stage::Notifying, "Dry run: skipping notification");
    } else {
        best_effort_notify(notifier, &summary, &manifest).await;
    }

    info!(stage = %Stage::Done, success = summary.is_success(), "Run complete");
    Ok(RunReport { manifest, summary })
}

/// Delete the local run tree only when a complete remote copy exists.
///
/// Retained when `keep_local` is set, when any destination failed, and when
/// no destination was configured at all (the local tree is then the only
/// copy). Deletion failure is logged, never fatal.
async fn clean_up(ctx: &RunContext, upload_results: &[crate::contract::UploadResult]) {
    let all_uploaded =
        !upload_results.is_empty() && upload_results.iter().all(|result| result.succeeded);
    if ctx.keep_local {
        info!("keep-local set; retaining local backup tree");
        return;
    }
    if !all_uploaded {
        warn!(
            path = %ctx.run_root().display(),
            "No complete remote copy exists; retaining local backup tree"
        );
        return;
    }
    match tokio::fs::remove_dir_all(ctx.run_root()).await {
        Ok(()) => info!(
            path = %ctx.run_root().display(),
            "Deleted local run tree after successful upload"
        ),
        Err(e) => warn!(
            path = %ctx.run_root().display(),
            error = %e,
            "Failed to delete local run tree"
        ),
    }
}

/// Notification never changes the run outcome; failures are logged only.
async fn best_effort_notify<N>(notifier: &N, summary: &RunSummary, manifest: &Manifest)
where
    N: Notifier + ?Sized,
{
    info!(
        stage = %Stage::Notifying,
        success = summary.is_success(),
        "Sending notification"
    );
    if let Err(e) = notifier.notify(summary, manifest).await {
        warn!(error = %e, "Notification could not be delivered; run outcome is unaffected");
    }
}
