//! Notification composition: the operator-facing summary of a run.
//!
//! Composing the subject and body is pure logic and lives here; delivering
//! the message is the [`crate::contract::Notifier`] implementor's job.

use crate::context::RunContext;
use crate::contract::{DiscoveryError, UploadResult};
use crate::manifest::Manifest;

/// Aggregated outcome of one run, input to the notification.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub organization: String,
    pub timestamp: String,
    pub total_repos: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub planned: usize,
    pub azure_enabled: bool,
    pub aws_enabled: bool,
    pub upload_results: Vec<UploadResult>,
    /// Set only when the run aborted before any per-repository work.
    pub fatal_error: Option<String>,
}

impl RunSummary {
    pub fn from_manifest(
        ctx: &RunContext,
        manifest: &Manifest,
        upload_results: Vec<UploadResult>,
    ) -> Self {
        let (succeeded, failed, planned) = manifest.counts();
        Self {
            organization: ctx.organization.clone(),
            timestamp: ctx.timestamp.clone(),
            total_repos: manifest.repos.len(),
            succeeded,
            failed,
            planned,
            azure_enabled: ctx.azure_enabled,
            aws_enabled: ctx.aws_enabled,
            upload_results,
            fatal_error: None,
        }
    }

    /// Summary for a run that died in discovery, before any work.
    pub fn discovery_failure(ctx: &RunContext, error: &DiscoveryError) -> Self {
        Self {
            organization: ctx.organization.clone(),
            timestamp: ctx.timestamp.clone(),
            total_repos: 0,
            succeeded: 0,
            failed: 0,
            planned: 0,
            azure_enabled: ctx.azure_enabled,
            aws_enabled: ctx.aws_enabled,
            upload_results: Vec::new(),
            fatal_error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.fatal_error.is_none()
            && self.failed == 0
            && self.upload_results.iter().all(|result| result.succeeded)
    }
}

pub fn compose_subject(summary: &RunSummary) -> String {
    let outcome = if summary.is_success() { "Success" } else { "Failed" };
    format!(
        "[repovault] {} - {} @ {}",
        outcome, summary.organization, summary.timestamp
    )
}

pub fn compose_body(summary: &RunSummary) -> String {
    let mut lines = Vec::new();
    if summary.is_success() {
        lines.push("Backup completed successfully.".to_string());
    } else {
        lines.push("Backup FAILED.".to_string());
    }
    lines.push(format!("Timestamp: {}", summary.timestamp));
    lines.push(format!("Organization: {}", summary.organization));
    lines.push(format!(
        "Total repos: {} ({} succeeded, {} failed, {} planned)",
        summary.total_repos, summary.succeeded, summary.failed, summary.planned
    ));
    lines.push(format!(
        "Azure upload: {}",
        if summary.azure_enabled { "Yes" } else { "No" }
    ));
    lines.push(format!(
        "AWS upload: {}",
        if summary.aws_enabled { "Yes" } else { "No" }
    ));

    for result in &summary.upload_results {
        match &result.error {
            None => lines.push(format!("{}: uploaded", result.kind)),
            Some(error) => lines.push(format!("{}: FAILED - {}", result.kind, error)),
        }
    }

    if let Some(error) = &summary.fatal_error {
        lines.push(String::new());
        lines.push("Error details:".to_string());
        lines.push(error.clone());
    }

    lines.join("\n")
}
