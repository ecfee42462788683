//! Upload dispatch: ship the local run tree to every configured destination.
//!
//! Destinations are isolated failure domains. Each gets its own
//! [`UploadResult`]; one destination failing never prevents the others from
//! being attempted. Remote paths mirror the local layout relative to the
//! backups root, and the manifest file is uploaded alongside the run tree.

use std::io;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{debug, error, info};

use crate::context::RunContext;
use crate::contract::{RemoteStore, UploadResult};

/// Upload the run tree (plus manifest) to each destination independently.
/// Returns one result per destination, in input order.
pub async fn dispatch(ctx: &RunContext, destinations: &[Box<dyn RemoteStore>]) -> Vec<UploadResult> {
    if destinations.is_empty() {
        info!("No remote destinations configured; archives remain local only");
        return Vec::new();
    }

    let uploads = match plan_uploads(ctx) {
        Ok(uploads) => uploads,
        Err(e) => {
            // Cannot even enumerate the local tree: every destination fails
            // with the same context.
            error!(error = %e, "Failed to read local run tree");
            return destinations
                .iter()
                .map(|store| UploadResult {
                    kind: store.kind(),
                    succeeded: false,
                    error: Some(format!("failed to read local run tree: {e}")),
                })
                .collect();
        }
    };

    let tasks = destinations
        .iter()
        .map(|store| upload_tree(store.as_ref(), &uploads));
    join_all(tasks).await
}

/// All (local path, cloud path) pairs for this run: every file under the run
/// root, then the manifest file next to it.
fn plan_uploads(ctx: &RunContext) -> io::Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    collect_files(&ctx.run_root(), &mut files)?;
    files.sort();

    let mut uploads: Vec<(PathBuf, String)> = files
        .into_iter()
        .filter_map(|local| {
            let cloud = ctx.cloud_path(&local)?;
            Some((local, cloud))
        })
        .collect();

    let manifest_path = ctx.manifest_path();
    if manifest_path.is_file() {
        uploads.push((manifest_path, ctx.manifest_file_name()));
    }
    Ok(uploads)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

async fn upload_tree(store: &dyn RemoteStore, uploads: &[(PathBuf, String)]) -> UploadResult {
    let kind = store.kind();
    info!(destination = %kind, files = uploads.len(), "Uploading backup tree");
    for (local, cloud) in uploads {
        let bytes = match tokio::fs::read(local).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(destination = %kind, path = %local.display(), error = %e, "Upload aborted");
                return UploadResult {
                    kind,
                    succeeded: false,
                    error: Some(format!("could not read {}: {e}", local.display())),
                };
            }
        };
        if let Err(e) = store.put(cloud, bytes).await {
            error!(destination = %kind, path = %cloud, error = %e, "Upload failed");
            return UploadResult {
                kind,
                succeeded: false,
                error: Some(format!("{cloud}: {e}")),
            };
        }
        debug!(destination = %kind, path = %cloud, "Uploaded");
    }
    info!(destination = %kind, "Upload complete");
    UploadResult {
        kind,
        succeeded: true,
        error: None,
    }
}
