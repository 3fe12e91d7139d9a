use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

use crate::config::GitLabConfig;
use crate::error::{Error, Result};
use crate::repository::{apply_exclusions, Repository};
use crate::source::{RepositorySource, PER_PAGE};

/// Account name paired with the token in authenticated clone URLs.
pub const CLONE_USERNAME: &str = "git";

const DEFAULT_URL: &str = "https://gitlab.com";

/// GitLab (or self-hosted GitLab) source driven by project query flags
pub struct GitLabSource {
    job_name: String,
    token: String,
    starred: bool,
    owned: bool,
    member: bool,
    exclude: Vec<String>,
    projects_url: Url,
    user_url: Url,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Project {
    http_url_to_repo: String,
    name_with_namespace: String,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    username: String,
}

/// One of the independent project listings unioned by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProjectQuery {
    Starred,
    Owned,
    Membership,
}

impl ProjectQuery {
    fn param(self) -> &'static str {
        match self {
            ProjectQuery::Starred => "starred",
            ProjectQuery::Owned => "owned",
            ProjectQuery::Membership => "membership",
        }
    }
}

impl GitLabSource {
    /// Build the source and its HTTP client from a resolved job configuration.
    pub fn new(config: &GitLabConfig) -> Result<Self> {
        let invalid = |message: String| Error::InvalidSource {
            job: config.job_name.clone(),
            message,
        };

        let api = api_root(config.url.as_deref().unwrap_or(DEFAULT_URL))
            .map_err(|e| invalid(format!("invalid url: {}", e)))?;
        let projects_url = api
            .join("projects")
            .map_err(|e| invalid(format!("invalid url: {}", e)))?;
        let user_url = api
            .join("user")
            .map_err(|e| invalid(format!("invalid url: {}", e)))?;

        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(&config.access_token)
            .map_err(|_| invalid("access_token is not a valid header value".to_string()))?;
        token.set_sensitive(true);
        headers.insert(HeaderName::from_static("private-token"), token);

        let client = reqwest::Client::builder()
            .user_agent(concat!("git-backup/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            job_name: config.job_name.clone(),
            token: config.access_token.clone(),
            starred: config.starred,
            owned: config.owned,
            member: config.member,
            exclude: config.exclude.clone(),
            projects_url,
            user_url,
            client,
        })
    }

    fn enabled_queries(&self) -> Vec<ProjectQuery> {
        [
            (self.starred, ProjectQuery::Starred),
            (self.owned, ProjectQuery::Owned),
            (self.member, ProjectQuery::Membership),
        ]
        .into_iter()
        .filter_map(|(on, query)| on.then_some(query))
        .collect()
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        query: &[(&str, String)],
    ) -> reqwest::Result<T> {
        self.client
            .get(url.clone())
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn fetch_page(&self, query: ProjectQuery, page: u32) -> reqwest::Result<Vec<Project>> {
        let params = [
            (query.param(), "true".to_string()),
            ("simple", "true".to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("page", page.to_string()),
        ];
        self.get_json(&self.projects_url, &params).await
    }

    /// Request pages 1, 2, ... until a page comes back empty.
    async fn list_query(&self, query: ProjectQuery) -> Result<Vec<Repository>> {
        let mut repositories = Vec::new();

        for page in 1u32.. {
            let projects = self
                .fetch_page(query, page)
                .await
                .map_err(|e| Error::communication(&self.job_name, e))?;

            if projects.is_empty() {
                break;
            }

            debug!("{} page {}: {} projects", query.param(), page, projects.len());

            for project in projects {
                let full_name = normalize_full_name(&project.name_with_namespace);
                let repo = Repository::with_credentials(
                    &project.http_url_to_repo,
                    full_name,
                    CLONE_USERNAME,
                    &self.token,
                )
                .map_err(|e| Error::communication(&self.job_name, e))?;
                repositories.push(repo);
            }
        }

        Ok(repositories)
    }
}

#[async_trait]
impl RepositorySource for GitLabSource {
    fn name(&self) -> &str {
        &self.job_name
    }

    async fn test(&self) -> Result<String> {
        let user: CurrentUser = self
            .get_json(&self.user_url, &[])
            .await
            .map_err(|e| Error::authentication(&self.job_name, e))?;

        info!("Authenticated with GitLab as: {}", user.username);
        Ok(user.username)
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        let mut by_name: BTreeMap<String, Repository> = BTreeMap::new();

        for query in self.enabled_queries() {
            let repos = self.list_query(query).await?;
            info!("Found {} {} projects", repos.len(), query.param());

            for repo in repos {
                by_name.insert(repo.full_name().to_string(), repo);
            }
        }

        Ok(apply_exclusions(by_name.into_values().collect(), &self.exclude))
    }
}

/// Resolve the REST API root (`.../api/v4/`) for a GitLab instance URL.
fn api_root(base: &str) -> std::result::Result<Url, url::ParseError> {
    let trimmed = base.trim().trim_end_matches('/');
    let root = if trimmed.ends_with("/api/v4") {
        format!("{}/", trimmed)
    } else {
        format!("{}/api/v4/", trimmed)
    };
    Url::parse(&root)
}

/// Turn `Group / Sub Group / Project` into `Group/Sub Group/Project`.
fn normalize_full_name(name_with_namespace: &str) -> String {
    name_with_namespace
        .split('/')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("/")
}
