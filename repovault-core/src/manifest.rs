//! The run manifest: the JSON audit record of everything attempted in a run.
//!
//! Records accumulate in arrival order (project discovery order, repository
//! order within a project) and are never re-sorted, so the manifest doubles
//! as a reproducible audit trail. Failed backups are recorded, not omitted:
//! the manifest always holds one record per (project, repository) pair that
//! passed exclusion filtering.
//!
//! The serialized shape keeps `{project, repo, zip_file, path}` stable for
//! existing consumers; `status` and `error` are additive extensions and
//! `error` is omitted entirely when absent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::RunContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    /// Dry run: the archive was named but never built.
    Planned,
    Succeeded,
    Failed,
}

/// One per (project, repository) pair processed in a run. Immutable once
/// appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub project: String,
    pub repo: String,
    pub zip_file: String,
    pub path: String,
    pub status: BackupStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackupRecord {
    fn named(ctx: &RunContext, project: &str, repo: &str, status: BackupStatus) -> Self {
        Self {
            project: project.to_string(),
            repo: repo.to_string(),
            zip_file: ctx.archive_name(project, repo),
            path: ctx.archive_path(project, repo).display().to_string(),
            status,
            error: None,
        }
    }

    /// Dry-run record. Shares the naming helpers with the execute path, so
    /// `zip_file` and `path` are byte-identical between the two modes.
    pub fn planned(ctx: &RunContext, project: &str, repo: &str) -> Self {
        Self::named(ctx, project, repo, BackupStatus::Planned)
    }

    pub fn succeeded(ctx: &RunContext, project: &str, repo: &str) -> Self {
        Self::named(ctx, project, repo, BackupStatus::Succeeded)
    }

    pub fn failed(
        ctx: &RunContext,
        project: &str,
        repo: &str,
        error: impl Into<String>,
    ) -> Self {
        let mut record = Self::named(ctx, project, repo, BackupStatus::Failed);
        record.error = Some(error.into());
        record
    }
}

/// The finalized audit document for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub organization: String,
    pub timestamp: String,
    pub repos: Vec<BackupRecord>,
}

impl Manifest {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// (succeeded, failed, planned) record counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for record in &self.repos {
            match record.status {
                BackupStatus::Succeeded => counts.0 += 1,
                BackupStatus::Failed => counts.1 += 1,
                BackupStatus::Planned => counts.2 += 1,
            }
        }
        counts
    }
}

/// Appending after `finalize` is a programming error in the caller.
#[derive(Debug, Error)]
#[error("manifest already finalised; records can no longer be appended")]
pub struct InvalidStateError;

/// Accumulates [`BackupRecord`]s in arrival order and produces the
/// [`Manifest`] exactly once.
#[derive(Debug)]
pub struct ManifestBuilder {
    organization: String,
    timestamp: String,
    records: Vec<BackupRecord>,
    finalised: Option<Manifest>,
}

impl ManifestBuilder {
    pub fn new(ctx: &RunContext) -> Self {
        Self {
            organization: ctx.organization.clone(),
            timestamp: ctx.timestamp.clone(),
            records: Vec::new(),
            finalised: None,
        }
    }

    pub fn append(&mut self, record: BackupRecord) -> Result<(), InvalidStateError> {
        if self.finalised.is_some() {
            return Err(InvalidStateError);
        }
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Idempotent: the first call freezes the manifest, later calls return
    /// the same document.
    pub fn finalize(&mut self) -> Manifest {
        if let Some(manifest) = &self.finalised {
            return manifest.clone();
        }
        let manifest = Manifest {
            organization: self.organization.clone(),
            timestamp: self.timestamp.clone(),
            repos: std::mem::take(&mut self.records),
        };
        self.finalised = Some(manifest.clone());
        manifest
    }
}
