//! Contracts between the pipeline and its external collaborators.
//!
//! Every collaborator the orchestrator talks to (the source-control provider,
//! the archive builder, remote object stores and the operator notifier) is a
//! trait defined here, so the production clients in the CLI crate and the
//! mocks used by tests are interchangeable.
//!
//! The traits are annotated for `mockall`; mocks are exported to dependent
//! crates behind the `test-export-mocks` feature.
//!
//! Failure semantics follow the run design: discovery errors are fatal and
//! typed, archive failures are data (a failed [`BackupRecord`]), store errors
//! are boxed at the seam and absorbed into per-destination results, and
//! notification errors never influence the run outcome.

use std::fmt;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use thiserror::Error;

use crate::context::RunContext;
use crate::manifest::{BackupRecord, Manifest};
use crate::notify::RunSummary;

/// Fatal discovery failure. Aborts the run before any per-repository work:
/// the manifest's completeness guarantee depends on a full listing.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("source-control provider unreachable: {0}")]
    Unreachable(String),
    #[error("source-control provider rejected authentication: {0}")]
    AuthRejected(String),
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Error type at the remote-store seam (boxed, implementor-defined).
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Notification failure. Logged by the orchestrator, never propagated.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport not configured: {0}")]
    NotConfigured(String),
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// A project as reported by the source-control provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    /// Unique within the organization; exclusion filtering matches on this.
    pub name: String,
}

/// A git repository owned by exactly one [`Project`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: String,
    pub name: String,
    /// Ready-to-clone URL, credentials embedded where the provider needs them.
    pub clone_url: String,
}

/// The kind of remote destination an upload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    BlobStore,
    ObjectStore,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationKind::BlobStore => write!(f, "blob-store"),
            DestinationKind::ObjectStore => write!(f, "object-store"),
        }
    }
}

/// Outcome of one destination's tree upload. Never partial: a destination
/// either completed the entire tree or is marked failed with error context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub kind: DestinationKind,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Enumerates projects and repositories for an organization.
///
/// Both calls fail with [`DiscoveryError`] when the provider is unreachable
/// or rejects authentication; either is fatal to the run.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>, DiscoveryError>;

    async fn list_repositories(
        &self,
        project: &Project,
    ) -> Result<Vec<Repository>, DiscoveryError>;
}

/// Clones one repository and produces its compressed archive.
///
/// Infallible by contract: clone and compression failures are returned as a
/// failed [`BackupRecord`] so the run continues with the remaining repos.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn build(
        &self,
        ctx: &RunContext,
        project: &Project,
        repo: &Repository,
    ) -> BackupRecord;
}

/// A remote object store: `put` writes one object at the given cloud path.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn kind(&self) -> DestinationKind;

    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError>;
}

/// Sends the run outcome to operators with the manifest attached.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &RunSummary, manifest: &Manifest) -> Result<(), NotifyError>;
}
