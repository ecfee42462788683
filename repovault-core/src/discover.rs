//! Discovery: enumerate the organization's projects and repositories.
//!
//! Exclusion filtering happens before any repository listing, so an excluded
//! project costs no provider calls. Any provider failure is fatal: a partial
//! listing would break the manifest's completeness guarantee.

use tracing::{info, warn};

use crate::context::RunContext;
use crate::contract::{DiscoveryError, Project, Repository, SourceProvider};

/// List all retained (project, repositories) pairs in provider order.
pub async fn discover<P>(
    ctx: &RunContext,
    provider: &P,
) -> Result<Vec<(Project, Vec<Repository>)>, DiscoveryError>
where
    P: SourceProvider + ?Sized,
{
    info!(organization = %ctx.organization, "Fetching projects");
    let projects = provider.list_projects().await?;
    let total = projects.len();

    let retained: Vec<Project> = projects
        .into_iter()
        .filter(|project| !ctx.is_excluded(&project.name))
        .collect();
    if retained.len() < total {
        info!(
            retained = retained.len(),
            excluded = total - retained.len(),
            "Dropped excluded projects before repository listing"
        );
    }

    let mut discovered = Vec::with_capacity(retained.len());
    for project in retained {
        info!(project = %project.name, "Fetching repositories");
        let repos = provider.list_repositories(&project).await?;
        if repos.is_empty() {
            warn!(project = %project.name, "No repositories found");
        }
        discovered.push((project, repos));
    }
    Ok(discovered)
}
