use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

/// Fixed-width, lexicographically sortable run timestamp, e.g. `20260807-1415`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M";

/// Default number of concurrent clone/archive workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Immutable description of one backup run.
///
/// Created once before the run starts and passed by reference to every
/// component; no component reads ambient configuration. All path and filename
/// derivation lives here so that a dry run and an execute run over the same
/// discovery output produce byte-identical names.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub organization: String,
    /// Fixed at construction and used for every path and filename of the run.
    pub timestamp: String,
    /// Project names dropped before any repository listing, exact match.
    pub excluded_projects: BTreeSet<String>,
    pub dry_run: bool,
    pub keep_local: bool,
    pub azure_enabled: bool,
    pub aws_enabled: bool,
    /// Parent directory of all run trees, `backups` by default.
    pub backups_root: PathBuf,
    /// Bound on concurrent archive builds.
    pub workers: usize,
}

impl RunContext {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            excluded_projects: BTreeSet::new(),
            dry_run: false,
            keep_local: false,
            azure_enabled: false,
            aws_enabled: false,
            backups_root: PathBuf::from("backups"),
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn trace_created(&self) {
        info!(
            organization = %self.organization,
            timestamp = %self.timestamp,
            dry_run = self.dry_run,
            keep_local = self.keep_local,
            azure = self.azure_enabled,
            aws = self.aws_enabled,
            excluded = self.excluded_projects.len(),
            workers = self.workers,
            "Run context created"
        );
        debug!(?self, "Run context (full debug)");
    }

    pub fn is_excluded(&self, project_name: &str) -> bool {
        self.excluded_projects.contains(project_name)
    }

    /// Root of this run's local tree: `{backups_root}/{timestamp}`.
    pub fn run_root(&self) -> PathBuf {
        self.backups_root.join(&self.timestamp)
    }

    /// Per-project directory: `{run_root}/{project}-{timestamp}`.
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.run_root().join(format!("{}-{}", project, self.timestamp))
    }

    /// Archive filename: `{project}-{repo}-{timestamp}.zip`.
    pub fn archive_name(&self, project: &str, repo: &str) -> String {
        format!("{}-{}-{}.zip", project, repo, self.timestamp)
    }

    pub fn archive_path(&self, project: &str, repo: &str) -> PathBuf {
        self.project_dir(project).join(self.archive_name(project, repo))
    }

    pub fn manifest_file_name(&self) -> String {
        format!("manifest-{}.json", self.timestamp)
    }

    /// Manifest lives next to the run tree, not inside it, so it survives the
    /// post-upload cleanup of the run root.
    pub fn manifest_path(&self) -> PathBuf {
        self.backups_root.join(self.manifest_file_name())
    }

    /// Remote object path for a local file: relative to `backups_root`, with
    /// forward slashes, so the cloud layout mirrors the local layout exactly.
    pub fn cloud_path(&self, local: &Path) -> Option<String> {
        let relative = local.strip_prefix(&self.backups_root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }
}
