//! End-to-end orchestrator scenarios with mocked collaborators.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::tempdir;

use repovault_core::context::RunContext;
use repovault_core::contract::{
    DestinationKind, DiscoveryError, MockArchiver, MockNotifier, MockRemoteStore,
    MockSourceProvider, Project, RemoteStore, Repository,
};
use repovault_core::manifest::{BackupRecord, BackupStatus};
use repovault_core::run::{run, RunError};

fn project(id: &str, name: &str) -> Project {
    Project {
        id: id.to_string(),
        name: name.to_string(),
    }
}

fn repo(id: &str, name: &str) -> Repository {
    Repository {
        id: id.to_string(),
        name: name.to_string(),
        clone_url: format!("https://example.invalid/{name}.git"),
    }
}

fn ctx_at(root: &Path) -> RunContext {
    let mut ctx = RunContext::new("acme");
    ctx.timestamp = "20260807-1200".to_string();
    ctx.backups_root = root.join("backups");
    ctx.workers = 2;
    ctx
}

/// Provider with two projects (Core: api, web; Tools: ci).
fn two_project_provider() -> MockSourceProvider {
    let mut provider = MockSourceProvider::new();
    provider
        .expect_list_projects()
        .return_once(|| Ok(vec![project("1", "Core"), project("2", "Tools")]));
    provider
        .expect_list_repositories()
        .withf(|p: &Project| p.name == "Core")
        .returning(|_| Ok(vec![repo("a", "api"), repo("b", "web")]));
    provider
        .expect_list_repositories()
        .withf(|p: &Project| p.name == "Tools")
        .returning(|_| Ok(vec![repo("c", "ci")]));
    provider
}

fn succeeding_archiver() -> MockArchiver {
    let mut archiver = MockArchiver::new();
    archiver
        .expect_build()
        .returning(|ctx, project, repo| BackupRecord::succeeded(ctx, &project.name, &repo.name));
    archiver
}

fn silent_notifier() -> MockNotifier {
    let mut notifier = MockNotifier::new();
    notifier.expect_notify().returning(|_, _| Ok(()));
    notifier
}

fn no_destinations() -> Vec<Box<dyn RemoteStore>> {
    Vec::new()
}

#[tokio::test]
async fn manifest_holds_one_record_per_retained_pair() {
    let tmp = tempdir().unwrap();
    let ctx = ctx_at(tmp.path());
    let provider = two_project_provider();
    let archiver = succeeding_archiver();
    let notifier = silent_notifier();

    let report = run(&ctx, &provider, &archiver, &no_destinations(), &notifier)
        .await
        .expect("run should reach Done");

    assert_eq!(report.manifest.repos.len(), 3);
    let names: Vec<(&str, &str)> = report
        .manifest
        .repos
        .iter()
        .map(|r| (r.project.as_str(), r.repo.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![("Core", "api"), ("Core", "web"), ("Tools", "ci")],
        "records must keep discovery order"
    );
}

#[tokio::test]
async fn excluded_project_is_never_queried_for_repositories() {
    let tmp = tempdir().unwrap();
    let mut ctx = ctx_at(tmp.path());
    ctx.excluded_projects = BTreeSet::from(["Legacy".to_string()]);

    let mut provider = MockSourceProvider::new();
    provider
        .expect_list_projects()
        .return_once(|| Ok(vec![project("1", "Core"), project("2", "Legacy")]));
    // Any repository listing for Legacy fails the test: only this expectation
    // exists, and it matches Core alone.
    provider
        .expect_list_repositories()
        .withf(|p: &Project| p.name == "Core")
        .times(1)
        .returning(|_| Ok(vec![repo("a", "api")]));

    let archiver = succeeding_archiver();
    let notifier = silent_notifier();

    let report = run(&ctx, &provider, &archiver, &no_destinations(), &notifier)
        .await
        .expect("run should reach Done");

    assert_eq!(report.manifest.repos.len(), 1);
    assert!(report.manifest.repos.iter().all(|r| r.project == "Core"));
}

#[tokio::test]
async fn dry_run_and_execute_name_archives_identically() {
    let tmp = tempdir().unwrap();

    let mut dry_ctx = ctx_at(tmp.path());
    dry_ctx.dry_run = true;
    let mut dry_notifier = MockNotifier::new();
    dry_notifier.expect_notify().times(0);
    let mut dry_archiver = MockArchiver::new();
    dry_archiver.expect_build().times(0);

    let dry_report = run(
        &dry_ctx,
        &two_project_provider(),
        &dry_archiver,
        &no_destinations(),
        &dry_notifier,
    )
    .await
    .expect("dry run should reach Done");

    assert!(dry_report
        .manifest
        .repos
        .iter()
        .all(|r| r.status == BackupStatus::Planned));
    assert!(
        !dry_ctx.backups_root.exists(),
        "dry run must not touch the filesystem"
    );

    let exec_ctx = ctx_at(tmp.path());
    let exec_report = run(
        &exec_ctx,
        &two_project_provider(),
        &succeeding_archiver(),
        &no_destinations(),
        &silent_notifier(),
    )
    .await
    .expect("execute run should reach Done");

    let dry_names: Vec<(&str, &str)> = dry_report
        .manifest
        .repos
        .iter()
        .map(|r| (r.zip_file.as_str(), r.path.as_str()))
        .collect();
    let exec_names: Vec<(&str, &str)> = exec_report
        .manifest
        .repos
        .iter()
        .map(|r| (r.zip_file.as_str(), r.path.as_str()))
        .collect();
    assert_eq!(dry_names, exec_names, "planning output must be a reliable preview");
}

#[tokio::test]
async fn clone_failure_is_recorded_and_run_continues() {
    let tmp = tempdir().unwrap();
    let ctx = ctx_at(tmp.path());
    let provider = two_project_provider();

    let mut archiver = MockArchiver::new();
    archiver
        .expect_build()
        .returning(|ctx, project, repo| {
            if repo.name == "api" {
                BackupRecord::failed(ctx, &project.name, &repo.name, "clone failed: network down")
            } else {
                BackupRecord::succeeded(ctx, &project.name, &repo.name)
            }
        });

    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(|summary, _| !summary.is_success() && summary.failed == 1 && summary.succeeded == 2)
        .times(1)
        .returning(|_, _| Ok(()));

    let report = run(&ctx, &provider, &archiver, &no_destinations(), &notifier)
        .await
        .expect("per-repo failure must not abort the run");

    assert_eq!(report.manifest.repos.len(), 3);
    let failed: Vec<&BackupRecord> = report
        .manifest
        .repos
        .iter()
        .filter(|r| r.status == BackupStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].repo, "api");
    assert!(failed[0].error.as_deref().unwrap().contains("network down"));
}

#[tokio::test]
async fn failed_upload_retains_local_tree() {
    let tmp = tempdir().unwrap();
    let ctx = ctx_at(tmp.path());

    let mut store = MockRemoteStore::new();
    store
        .expect_kind()
        .return_const(DestinationKind::BlobStore);
    store
        .expect_put()
        .returning(|_, _| Err("connection refused".into()));
    let destinations: Vec<Box<dyn RemoteStore>> = vec![Box::new(store)];

    let report = run(
        &ctx,
        &two_project_provider(),
        &succeeding_archiver(),
        &destinations,
        &silent_notifier(),
    )
    .await
    .expect("upload failure must not abort the run");

    assert_eq!(report.summary.upload_results.len(), 1);
    assert!(!report.summary.upload_results[0].succeeded);
    assert!(
        ctx.run_root().exists(),
        "local tree must survive when no complete remote copy exists"
    );
}

#[tokio::test]
async fn successful_upload_deletes_local_tree_before_notification() {
    let tmp = tempdir().unwrap();
    let ctx = ctx_at(tmp.path());

    let uploaded = Arc::new(Mutex::new(Vec::new()));
    let mut store = MockRemoteStore::new();
    store
        .expect_kind()
        .return_const(DestinationKind::BlobStore);
    let seen = uploaded.clone();
    store.expect_put().returning(move |path, _| {
        seen.lock().unwrap().push(path.to_string());
        Ok(())
    });
    let destinations: Vec<Box<dyn RemoteStore>> = vec![Box::new(store)];

    let run_root = ctx.run_root();
    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(move |_, _| !run_root.exists())
        .times(1)
        .returning(|_, _| Ok(()));

    let report = run(
        &ctx,
        &two_project_provider(),
        &succeeding_archiver(),
        &destinations,
        &notifier,
    )
    .await
    .expect("run should reach Done");

    assert!(report.summary.upload_results[0].succeeded);
    assert!(!ctx.run_root().exists(), "run tree is deleted after upload");
    assert!(
        ctx.manifest_path().exists(),
        "manifest survives cleanup as the local audit record"
    );
    assert!(uploaded
        .lock()
        .unwrap()
        .contains(&"manifest-20260807-1200.json".to_string()));
}

#[tokio::test]
async fn keep_local_retains_tree_after_successful_upload() {
    let tmp = tempdir().unwrap();
    let mut ctx = ctx_at(tmp.path());
    ctx.keep_local = true;

    let mut store = MockRemoteStore::new();
    store
        .expect_kind()
        .return_const(DestinationKind::ObjectStore);
    store.expect_put().returning(|_, _| Ok(()));
    let destinations: Vec<Box<dyn RemoteStore>> = vec![Box::new(store)];

    run(
        &ctx,
        &two_project_provider(),
        &succeeding_archiver(),
        &destinations,
        &silent_notifier(),
    )
    .await
    .expect("run should reach Done");

    assert!(ctx.run_root().exists());
}

#[tokio::test]
async fn one_destination_failure_does_not_block_the_other() {
    let tmp = tempdir().unwrap();
    let ctx = ctx_at(tmp.path());

    let mut azure = MockRemoteStore::new();
    azure
        .expect_kind()
        .return_const(DestinationKind::BlobStore);
    azure
        .expect_put()
        .times(1..)
        .returning(|_, _| Err("azure unreachable".into()));

    let aws_calls = Arc::new(Mutex::new(0usize));
    let counter = aws_calls.clone();
    let mut aws = MockRemoteStore::new();
    aws.expect_kind()
        .return_const(DestinationKind::ObjectStore);
    aws.expect_put().returning(move |_, _| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });

    let destinations: Vec<Box<dyn RemoteStore>> = vec![Box::new(azure), Box::new(aws)];

    let report = run(
        &ctx,
        &two_project_provider(),
        &succeeding_archiver(),
        &destinations,
        &silent_notifier(),
    )
    .await
    .expect("run should reach Done");

    let results = &report.summary.upload_results;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].kind, DestinationKind::BlobStore);
    assert!(!results[0].succeeded);
    assert!(results[0].error.as_deref().unwrap().contains("azure unreachable"));
    assert_eq!(results[1].kind, DestinationKind::ObjectStore);
    assert!(results[1].succeeded);
    assert!(*aws_calls.lock().unwrap() > 0, "second destination must still be attempted");
    assert!(ctx.run_root().exists(), "partial remote coverage keeps the local tree");
}

#[tokio::test]
async fn discovery_failure_aborts_before_processing_with_notification() {
    let tmp = tempdir().unwrap();
    let ctx = ctx_at(tmp.path());

    let mut provider = MockSourceProvider::new();
    provider
        .expect_list_projects()
        .return_once(|| Err(DiscoveryError::AuthRejected("PAT expired".to_string())));

    let mut archiver = MockArchiver::new();
    archiver.expect_build().times(0);

    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(|summary, manifest| {
            summary.fatal_error.as_deref().is_some_and(|e| e.contains("PAT expired"))
                && manifest.repos.is_empty()
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let result = run(&ctx, &provider, &archiver, &no_destinations(), &notifier).await;
    assert!(matches!(
        result,
        Err(RunError::Discovery(DiscoveryError::AuthRejected(_)))
    ));
    assert!(!ctx.backups_root.exists(), "no work happens after a discovery failure");
}

#[tokio::test]
async fn notification_failure_never_changes_the_run_outcome() {
    let tmp = tempdir().unwrap();
    let ctx = ctx_at(tmp.path());

    let mut notifier = MockNotifier::new();
    notifier.expect_notify().times(1).returning(|_, _| {
        Err(repovault_core::contract::NotifyError::Delivery(
            "bad SMTP credentials".to_string(),
        ))
    });

    let report = run(
        &ctx,
        &two_project_provider(),
        &succeeding_archiver(),
        &no_destinations(),
        &notifier,
    )
    .await
    .expect("notification failure must be absorbed");
    assert!(report.summary.is_success());
}

#[tokio::test]
async fn zero_destinations_keep_the_local_tree() {
    let tmp = tempdir().unwrap();
    let ctx = ctx_at(tmp.path());

    run(
        &ctx,
        &two_project_provider(),
        &succeeding_archiver(),
        &no_destinations(),
        &silent_notifier(),
    )
    .await
    .expect("run should reach Done");

    assert!(
        ctx.run_root().exists(),
        "with no destinations the local tree is the only copy"
    );
}
