//! Archive building: clone one repository and compress its working tree.
//!
//! The clone lands in a transient directory scoped to the call and is removed
//! unconditionally, whether the clone or the compression fails or not. All
//! failures come back as a failed [`BackupRecord`]; nothing here aborts the
//! run.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

use crate::context::RunContext;
use crate::contract::{Archiver, Project, Repository};
use crate::manifest::BackupRecord;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("clone failed: {0}")]
    Clone(String),
    #[error("compression failed: {0}")]
    Compression(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Production [`Archiver`]: spawns `git clone` and writes a zip of the
/// resulting working tree (including `.git`, so history survives the
/// snapshot).
pub struct GitArchiver;

#[async_trait]
impl Archiver for GitArchiver {
    async fn build(&self, ctx: &RunContext, project: &Project, repo: &Repository) -> BackupRecord {
        info!(project = %project.name, repo = %repo.name, "Building archive");
        match build_archive(ctx, project, repo).await {
            Ok(path) => {
                info!(path = %path.display(), "Archive written");
                BackupRecord::succeeded(ctx, &project.name, &repo.name)
            }
            Err(e) => {
                error!(
                    project = %project.name,
                    repo = %repo.name,
                    error = %e,
                    "Backup failed; continuing with remaining repositories"
                );
                BackupRecord::failed(ctx, &project.name, &repo.name, e.to_string())
            }
        }
    }
}

async fn build_archive(
    ctx: &RunContext,
    project: &Project,
    repo: &Repository,
) -> Result<PathBuf, ArchiveError> {
    let project_dir = ctx.project_dir(&project.name);
    tokio::fs::create_dir_all(&project_dir).await?;

    // Transient clone directory; dropped (and thus deleted) on every exit
    // path out of this function.
    let clone_dir = tempfile::Builder::new()
        .prefix(".clone-")
        .tempdir_in(&project_dir)?;
    let checkout = clone_dir.path().join(&repo.name);

    let output = Command::new("git")
        .arg("clone")
        .arg(&repo.clone_url)
        .arg(&checkout)
        .output()
        .await
        .map_err(|e| ArchiveError::Clone(format!("failed to launch git: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ArchiveError::Clone(format!(
            "git exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let archive_path = ctx.archive_path(&project.name, &repo.name);
    let target = archive_path.clone();
    let archive_root = repo.name.clone();
    tokio::task::spawn_blocking(move || write_zip(&checkout, &target, &archive_root))
        .await
        .map_err(|e| ArchiveError::Compression(format!("compression task failed: {e}")))??;
    Ok(archive_path)
}

/// Write a deflate-compressed zip of `src`, rooting all entries at `root/`.
fn write_zip(src: &Path, target: &Path, root: &str) -> Result<(), ArchiveError> {
    let file = std::fs::File::create(target)
        .map_err(|e| ArchiveError::Compression(format!("cannot create {}: {e}", target.display())))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    add_dir(&mut writer, src, Path::new(root), options)?;
    writer
        .finish()
        .map_err(|e| ArchiveError::Compression(e.to_string()))?;
    Ok(())
}

fn add_dir(
    writer: &mut zip::ZipWriter<std::fs::File>,
    dir: &Path,
    prefix: &Path,
    options: zip::write::SimpleFileOptions,
) -> Result<(), ArchiveError> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let path = entry.path();
        let name = prefix.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            add_dir(writer, &path, &name, options)?;
        } else if file_type.is_file() {
            let entry_name = name.to_string_lossy().replace('\\', "/");
            writer
                .start_file(entry_name, options)
                .map_err(|e| ArchiveError::Compression(e.to_string()))?;
            let mut source = std::fs::File::open(&path)?;
            std::io::copy(&mut source, writer)
                .map_err(|e| ArchiveError::Compression(e.to_string()))?;
        }
        // Symlinks are skipped; a fresh clone of backup-relevant content has
        // its data in regular files.
    }
    Ok(())
}
