/// This module implements the full CLI interface for repovault: argument
/// parsing, collaborator wiring, and the user-visible entrypoint.
///
/// All core business logic (discovery, archiving, manifest, orchestration)
/// lives in the [`repovault-core`] crate. This module is strictly for CLI
/// glue: turning flags and environment into a `RunContext` and concrete
/// collaborators, then handing off to the orchestrator.
///
/// ## How To Use
/// - For command-line users: use the installed `repovault` binary with
///   `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed
///   [`Cli`].
///
/// The process exits 0 whenever the run reaches its final stage, even with
/// per-repository failures recorded in the manifest; a discovery failure (or
/// any unhandled fault) exits non-zero.
///
/// [`repovault-core`]: ../../repovault-core/
use std::collections::BTreeSet;

use anyhow::{Context as _, Result};
use clap::Parser;

use repovault_core::archive::GitArchiver;
use repovault_core::context::{RunContext, DEFAULT_WORKERS};
use repovault_core::contract::RemoteStore;
use repovault_core::run::{run as run_pipeline, RunReport};

use crate::mailer::EmailNotifier;
use crate::provider::DevOpsProvider;
use crate::settings;
use crate::store::{AzureBlobStore, S3Store};

/// CLI for repovault: back up every git repository of an organization.
#[derive(Debug, Parser)]
#[clap(
    name = "repovault",
    version,
    about = "Back up all git repositories of a source-control organization, locally and optionally to Azure Blob / AWS S3"
)]
pub struct Cli {
    /// Source-control organization to back up
    #[clap(long)]
    pub org: String,

    /// Upload the finished backup tree to Azure Blob storage
    #[clap(long)]
    pub azure_backup: bool,

    /// Upload the finished backup tree to AWS S3
    #[clap(long)]
    pub aws_backup: bool,

    /// Plan the run without cloning, archiving, uploading or notifying
    #[clap(long)]
    pub dry_run: bool,

    /// Project to exclude by exact name (repeatable)
    #[clap(long = "exclude-project")]
    pub exclude_project: Vec<String>,

    /// Retain the local backup tree after a successful upload
    #[clap(long)]
    pub keep_local: bool,

    /// Concurrent clone/archive workers
    #[clap(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<RunReport> {
    let pat = settings::provider_pat()?;

    let mut ctx = RunContext::new(&cli.org);
    ctx.excluded_projects = cli.exclude_project.iter().cloned().collect::<BTreeSet<_>>();
    ctx.dry_run = cli.dry_run;
    ctx.keep_local = cli.keep_local;
    ctx.azure_enabled = cli.azure_backup;
    ctx.aws_enabled = cli.aws_backup;
    ctx.workers = cli.workers;
    ctx.trace_created();

    // Store clients are only constructed when a run will actually upload;
    // a dry run must not require storage credentials.
    let mut destinations: Vec<Box<dyn RemoteStore>> = Vec::new();
    if cli.azure_backup && !cli.dry_run {
        let store_settings = settings::azure_store()
            .context("Azure backup requested but storage settings are incomplete")?;
        destinations.push(Box::new(AzureBlobStore::new(store_settings)?));
    }
    if cli.aws_backup && !cli.dry_run {
        let store_settings = settings::aws_store()
            .context("AWS backup requested but storage settings are incomplete")?;
        destinations.push(Box::new(S3Store::new(store_settings)));
    }

    let provider = DevOpsProvider::new(&cli.org, &pat);
    let notifier = EmailNotifier::from_env();

    let report = run_pipeline(&ctx, &provider, &GitArchiver, &destinations, &notifier).await?;

    if cli.dry_run {
        // The planned manifest is the preview output of a dry run.
        println!("{}", report.manifest.to_json_pretty()?);
    }
    Ok(report)
}
