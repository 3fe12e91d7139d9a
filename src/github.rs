use async_trait::async_trait;
use octocrab::{Octocrab, Page};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GitHubConfig;
use crate::error::{Error, Result};
use crate::repository::{apply_exclusions, dedup_by_full_name, Repository};
use crate::source::{RepositorySource, PER_PAGE};

/// Account name paired with the token in authenticated clone URLs.
pub const CLONE_USERNAME: &str = "github";

/// GitHub (or GitHub Enterprise) source driven by affiliation flags
pub struct GitHubSource {
    job_name: String,
    token: String,
    owned: bool,
    collaborator: bool,
    org_member: bool,
    starred: bool,
    exclude: Vec<String>,
    client: Octocrab,
}

/// The parts of the GitHub repository payload the backup needs
#[derive(Debug, Deserialize)]
struct ApiRepository {
    full_name: String,
    clone_url: String,
}

#[derive(Debug, Deserialize)]
struct Identity {
    login: String,
}

#[derive(Debug, Serialize)]
struct ListParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    affiliation: Option<&'a str>,
    per_page: u8,
}

impl GitHubSource {
    /// Build the source and its API client from a resolved job configuration.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let invalid = |e: octocrab::Error| Error::InvalidSource {
            job: config.job_name.clone(),
            message: e.to_string(),
        };

        let mut builder = Octocrab::builder().personal_token(config.access_token.clone());

        if let Some(url) = &config.url {
            let api = format!("{}/api/v3/", url.trim_end_matches('/'));
            debug!("Using GitHub Enterprise API at {}", api);
            builder = builder.base_uri(api).map_err(invalid)?;
        }

        let client = builder.build().map_err(invalid)?;

        Ok(Self {
            job_name: config.job_name.clone(),
            token: config.access_token.clone(),
            owned: config.owned,
            collaborator: config.collaborator,
            org_member: config.org_member,
            starred: config.starred,
            exclude: config.exclude.clone(),
            client,
        })
    }

    /// Walk a paginated listing until an empty page or a missing next link.
    async fn list_pages(
        &self,
        route: &str,
        affiliation: Option<&str>,
    ) -> std::result::Result<Vec<ApiRepository>, octocrab::Error> {
        let params = ListParams {
            affiliation,
            per_page: PER_PAGE,
        };

        let mut repositories = Vec::new();
        let mut page: Page<ApiRepository> = self.client.get(route, Some(&params)).await?;
        let mut number = 1u32;

        loop {
            if page.items.is_empty() {
                break;
            }

            debug!("{} page {}: {} repositories", route, number, page.items.len());
            repositories.append(&mut page.items);

            match self.client.get_page::<ApiRepository>(&page.next).await? {
                Some(next) => page = next,
                None => break,
            }
            number += 1;
        }

        Ok(repositories)
    }

    fn authenticate(&self, repo: ApiRepository) -> Result<Repository> {
        Repository::with_credentials(&repo.clone_url, repo.full_name, CLONE_USERNAME, &self.token)
            .map_err(|e| Error::communication(&self.job_name, e))
    }
}

#[async_trait]
impl RepositorySource for GitHubSource {
    fn name(&self) -> &str {
        &self.job_name
    }

    async fn test(&self) -> Result<String> {
        let me: Identity = self
            .client
            .get("/user", None::<&()>)
            .await
            .map_err(|e| Error::authentication(&self.job_name, e))?;

        info!("Authenticated with GitHub as: {}", me.login);
        Ok(me.login)
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        let mut found = Vec::new();

        match affiliation_query(self.owned, self.collaborator, self.org_member) {
            Some(affiliation) => {
                let repos = self
                    .list_pages("/user/repos", Some(&affiliation))
                    .await
                    .map_err(|e| Error::communication(&self.job_name, e))?;
                info!("Found {} repositories with affiliation {}", repos.len(), affiliation);
                found.extend(repos);
            }
            None => debug!("All affiliations disabled, skipping affiliated repositories"),
        }

        if self.starred {
            let repos = self
                .list_pages("/user/starred", None)
                .await
                .map_err(|e| Error::communication(&self.job_name, e))?;
            info!("Found {} starred repositories", repos.len());
            found.extend(repos);
        }

        let repositories = found
            .into_iter()
            .map(|repo| self.authenticate(repo))
            .collect::<Result<Vec<_>>>()?;

        Ok(apply_exclusions(dedup_by_full_name(repositories), &self.exclude))
    }
}

/// Combine the enabled affiliations into the `affiliation` query value.
///
/// Returns `None` when every affiliation is disabled.
fn affiliation_query(owned: bool, collaborator: bool, org_member: bool) -> Option<String> {
    let enabled: Vec<&str> = [
        (owned, "owner"),
        (collaborator, "collaborator"),
        (org_member, "organization_member"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();

    if enabled.is_empty() {
        None
    } else {
        Some(enabled.join(","))
    }
}
