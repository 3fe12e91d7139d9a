//! The repository entity shared by every source and the sync engine.

use std::fmt;
use url::Url;

const REDACTED: &str = "***";

/// A remote repository ready to be mirrored.
///
/// The clone URL carries the access token as basic-auth user-info, so the
/// sync engine never needs provider-specific credential handling.
#[derive(Clone, PartialEq, Eq)]
pub struct Repository {
    git_url: Url,
    full_name: String,
}

impl Repository {
    /// Create a repository from an already usable clone URL.
    pub fn new(git_url: Url, full_name: impl Into<String>) -> Self {
        Self {
            git_url,
            full_name: full_name.into(),
        }
    }

    /// Parse a provider clone URL and embed `username:token` as user-info.
    pub fn with_credentials(
        clone_url: &str,
        full_name: impl Into<String>,
        username: &str,
        token: &str,
    ) -> Result<Self, CredentialsError> {
        let mut git_url = Url::parse(clone_url).map_err(|e| CredentialsError {
            url: clone_url.to_string(),
            reason: e.to_string(),
        })?;

        git_url
            .set_username(username)
            .and_then(|_| git_url.set_password(Some(token)))
            .map_err(|_| CredentialsError {
                url: clone_url.to_string(),
                reason: "URL cannot carry credentials".to_string(),
            })?;

        Ok(Self::new(git_url, full_name))
    }

    /// Canonical `owner/name`, case preserved from the provider.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The authenticated clone URL. Contains the token; never log it.
    pub fn git_url(&self) -> &Url {
        &self.git_url
    }

    /// Clone URL with the password replaced, safe for logs.
    pub fn redacted_url(&self) -> String {
        let mut url = self.git_url.clone();
        if url.password().is_some() {
            let _ = url.set_password(Some(REDACTED));
        }
        url.to_string()
    }

    /// Replace every occurrence of the embedded token in `text`.
    pub fn redact(&self, text: &str) -> String {
        match self.git_url.password() {
            Some(token) if !token.is_empty() => text.replace(token, REDACTED),
            _ => text.to_string(),
        }
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("git_url", &self.redacted_url())
            .field("full_name", &self.full_name)
            .finish()
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// A provider returned a clone URL that cannot be authenticated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid clone URL '{url}': {reason}")]
pub struct CredentialsError {
    pub url: String,
    pub reason: String,
}

fn owner_segment(full_name: &str) -> &str {
    full_name
        .split_once('/')
        .map(|(owner, _)| owner)
        .unwrap_or(full_name)
}

/// Check whether `full_name` is matched by any exclusion pattern.
///
/// A pattern matches when it equals the full name ignoring case, or, when
/// it contains no `/`, when it equals the owner segment ignoring case.
pub fn is_excluded(full_name: &str, patterns: &[String]) -> bool {
    let name = full_name.to_lowercase();
    let owner = owner_segment(&name);

    patterns.iter().any(|pattern| {
        let pattern = pattern.trim().to_lowercase();
        pattern == name || (!pattern.contains('/') && pattern == owner)
    })
}

/// Drop repositories matched by `patterns`, logging each one.
pub fn apply_exclusions(repositories: Vec<Repository>, patterns: &[String]) -> Vec<Repository> {
    if patterns.is_empty() {
        return repositories;
    }

    repositories
        .into_iter()
        .filter(|repo| {
            let excluded = is_excluded(repo.full_name(), patterns);
            if excluded {
                tracing::info!("Excluding {}", repo.full_name());
            }
            !excluded
        })
        .collect()
}

/// Collapse entries sharing a full name.
///
/// The first appearance keeps its position, the last appearance provides
/// the value.
pub fn dedup_by_full_name(repositories: Vec<Repository>) -> Vec<Repository> {
    let mut out: Vec<Repository> = Vec::with_capacity(repositories.len());
    let mut index = std::collections::HashMap::new();

    for repo in repositories {
        match index.get(repo.full_name()) {
            Some(&position) => out[position] = repo,
            None => {
                index.insert(repo.full_name().to_string(), out.len());
                out.push(repo);
            }
        }
    }

    out
}
