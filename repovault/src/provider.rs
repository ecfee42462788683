//! Source-control provider client: discovery over the provider's REST API.
//!
//! Implements [`SourceProvider`] against an Azure-DevOps-style API: projects
//! at `{base}/_apis/projects`, repositories at
//! `{base}/{project}/_apis/git/repositories`, basic auth with an empty user
//! and the PAT as password. The clone URL handed to the archiver embeds the
//! PAT so `git clone` needs no credential helper.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use repovault_core::contract::{DiscoveryError, Project, Repository, SourceProvider};

const API_VERSION: &str = "7.0";

pub struct DevOpsProvider {
    client: reqwest::Client,
    base_url: String,
    organization: String,
    pat: String,
}

/// Provider list responses wrap their payload in a `value` array.
#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    #[serde(default)]
    value: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectPayload {
    id: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryPayload {
    id: String,
    name: String,
    remote_url: String,
}

impl DevOpsProvider {
    pub fn new(organization: &str, pat: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("https://dev.azure.com/{organization}"),
            organization: organization.to_string(),
            pat: pat.to_string(),
        }
    }

    async fn get_json<T>(&self, url: &str) -> Result<T, DiscoveryError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .get(url)
            .basic_auth("", Some(&self.pat))
            .send()
            .await
            .map_err(|e| {
                error!(url, error = %e, "Provider request failed");
                DiscoveryError::Unreachable(e.to_string())
            })?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            error!(url, %status, "Provider rejected credentials");
            return Err(DiscoveryError::AuthRejected(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            error!(url, %status, "Provider returned error status");
            return Err(DiscoveryError::Unreachable(format!("{url} returned {status}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| DiscoveryError::InvalidResponse(e.to_string()))
    }

    /// Rewrite the reported remote URL into a PAT-authenticated clone URL.
    /// Falls back to the canonical `{org}/{project}/_git/{repo}` path when
    /// the remote URL does not contain the organization segment.
    fn authenticated_clone_url(&self, project: &Project, payload: &RepositoryPayload) -> String {
        let marker = format!("/{}/", self.organization);
        match payload.remote_url.split_once(&marker) {
            Some((_, rest)) => format!(
                "https://:{}@dev.azure.com/{}/{}",
                self.pat, self.organization, rest
            ),
            None => format!(
                "https://:{}@dev.azure.com/{}/{}/_git/{}",
                self.pat, self.organization, project.name, payload.name
            ),
        }
    }
}

#[async_trait]
impl SourceProvider for DevOpsProvider {
    async fn list_projects(&self) -> Result<Vec<Project>, DiscoveryError> {
        let url = format!("{}/_apis/projects?api-version={API_VERSION}", self.base_url);
        info!(organization = %self.organization, "Fetching project list");
        let envelope: ListEnvelope<ProjectPayload> = self.get_json(&url).await?;
        info!(count = envelope.value.len(), "Fetched projects");
        Ok(envelope
            .value
            .into_iter()
            .map(|payload| Project {
                id: payload.id,
                name: payload.name,
            })
            .collect())
    }

    async fn list_repositories(
        &self,
        project: &Project,
    ) -> Result<Vec<Repository>, DiscoveryError> {
        let url = format!(
            "{}/{}/_apis/git/repositories?api-version={API_VERSION}",
            self.base_url, project.name
        );
        info!(project = %project.name, "Fetching repository list");
        let envelope: ListEnvelope<RepositoryPayload> = self.get_json(&url).await?;
        info!(project = %project.name, count = envelope.value.len(), "Fetched repositories");
        Ok(envelope
            .value
            .into_iter()
            .map(|payload| {
                let clone_url = self.authenticated_clone_url(project, &payload);
                Repository {
                    id: payload.id,
                    name: payload.name,
                    clone_url,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> DevOpsProvider {
        DevOpsProvider::new("acme", "secret-pat")
    }

    fn payload(name: &str, remote_url: &str) -> RepositoryPayload {
        RepositoryPayload {
            id: "r1".to_string(),
            name: name.to_string(),
            remote_url: remote_url.to_string(),
        }
    }

    fn core_project() -> Project {
        Project {
            id: "p1".to_string(),
            name: "Core".to_string(),
        }
    }

    #[test]
    fn clone_url_embeds_pat_and_keeps_repo_path() {
        let url = provider().authenticated_clone_url(
            &core_project(),
            &payload("api", "https://dev.azure.com/acme/Core/_git/api"),
        );
        assert_eq!(url, "https://:secret-pat@dev.azure.com/acme/Core/_git/api");
    }

    #[test]
    fn clone_url_falls_back_to_canonical_path() {
        let url = provider().authenticated_clone_url(
            &core_project(),
            &payload("api", "https://mirror.example.com/git/api"),
        );
        assert_eq!(url, "https://:secret-pat@dev.azure.com/acme/Core/_git/api");
    }

    #[test]
    fn list_envelope_tolerates_missing_value() {
        let envelope: ListEnvelope<ProjectPayload> = serde_json::from_str("{}").unwrap();
        assert!(envelope.value.is_empty());
    }
}
