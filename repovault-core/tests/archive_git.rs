//! Archive builder tests against real git fixture repositories.

use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

use repovault_core::archive::GitArchiver;
use repovault_core::context::RunContext;
use repovault_core::contract::{Archiver, Project, Repository};
use repovault_core::manifest::BackupStatus;

fn git(cwd: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .status()
        .expect("git must be runnable in tests");
    assert!(status.success(), "git {:?} failed", args);
}

/// Create a small local repository with one commit to clone from.
fn init_fixture_repo(dir: &Path) {
    git(dir, &["init"]);
    git(dir, &["config", "user.email", "tests@example.com"]);
    git(dir, &["config", "user.name", "tests"]);
    std::fs::write(dir.join("README.md"), "fixture repository\n").unwrap();
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(dir.join("src").join("lib.rs"), "pub fn answer() -> u32 { 42 }\n").unwrap();
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-m", "initial"]);
}

fn ctx_at(root: &Path) -> RunContext {
    let mut ctx = RunContext::new("acme");
    ctx.timestamp = "20260807-1200".to_string();
    ctx.backups_root = root.join("backups");
    ctx
}

fn core_project() -> Project {
    Project {
        id: "1".to_string(),
        name: "Core".to_string(),
    }
}

#[tokio::test]
async fn build_clones_and_zips_the_working_tree() {
    let fixture = tempdir().unwrap();
    init_fixture_repo(fixture.path());

    let tmp = tempdir().unwrap();
    let ctx = ctx_at(tmp.path());
    let project = core_project();
    let repo = Repository {
        id: "a".to_string(),
        name: "api".to_string(),
        clone_url: fixture.path().display().to_string(),
    };

    let record = GitArchiver.build(&ctx, &project, &repo).await;
    assert_eq!(record.status, BackupStatus::Succeeded);
    assert_eq!(record.zip_file, "Core-api-20260807-1200.zip");

    let archive_path = ctx.archive_path("Core", "api");
    assert!(archive_path.is_file(), "archive must exist at the documented path");

    let file = std::fs::File::open(&archive_path).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"api/README.md"), "entries are rooted at the repo name: {names:?}");
    assert!(names.contains(&"api/src/lib.rs"));
    assert!(
        names.iter().any(|n| n.starts_with("api/.git/")),
        "history is part of the snapshot"
    );

    // The transient clone directory is gone; only the archive remains.
    let entries: Vec<_> = std::fs::read_dir(ctx.project_dir("Core"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 1, "no leftover clone directories");
}

#[tokio::test]
async fn clone_failure_yields_failed_record_and_no_leftovers() {
    let tmp = tempdir().unwrap();
    let ctx = ctx_at(tmp.path());
    let project = core_project();
    let repo = Repository {
        id: "b".to_string(),
        name: "ghost".to_string(),
        clone_url: tmp.path().join("does-not-exist").display().to_string(),
    };

    let record = GitArchiver.build(&ctx, &project, &repo).await;
    assert_eq!(record.status, BackupStatus::Failed);
    let error = record.error.as_deref().unwrap();
    assert!(error.contains("clone failed"), "error detail: {error}");

    assert!(!ctx.archive_path("Core", "ghost").exists());
    let entries: Vec<_> = std::fs::read_dir(ctx.project_dir("Core"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(entries.is_empty(), "transient clone directory is removed on failure");
}

#[tokio::test]
async fn naming_matches_the_planned_record() {
    // The archiver and the dry-run planner must derive names from the same
    // source; compare a failed build (no git work needed) with its planned
    // counterpart.
    let tmp = tempdir().unwrap();
    let ctx = ctx_at(tmp.path());
    let project = core_project();
    let repo = Repository {
        id: "c".to_string(),
        name: "web".to_string(),
        clone_url: tmp.path().join("missing").display().to_string(),
    };

    let built = GitArchiver.build(&ctx, &project, &repo).await;
    let planned = repovault_core::manifest::BackupRecord::planned(&ctx, "Core", "web");
    assert_eq!(built.zip_file, planned.zip_file);
    assert_eq!(built.path, planned.path);
}
