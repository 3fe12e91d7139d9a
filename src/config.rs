use anyhow::{Context, Result};
use dirs::config_dir;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::github::GitHubSource;
use crate::gitlab::GitLabSource;
use crate::source::RepositorySource;

/// Default config file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "git-backup.yml";

/// Main configuration structure: one entry per backup job
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// GitHub jobs
    #[serde(default)]
    pub github: Vec<GitHubConfig>,

    /// GitLab jobs
    #[serde(default)]
    pub gitlab: Vec<GitLabConfig>,
}

/// GitHub job configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GitHubConfig {
    /// Display name, also the directory the job's repositories land in
    #[serde(default = "default_github_job_name")]
    pub job_name: String,

    /// Personal access token (`${VAR}` is expanded)
    pub access_token: String,

    /// GitHub Enterprise instance URL
    #[serde(default)]
    pub url: Option<String>,

    /// Include repositories owned by the user
    #[serde(default = "default_true")]
    pub owned: bool,

    /// Include repositories the user collaborates on
    #[serde(default = "default_true")]
    pub collaborator: bool,

    /// Include repositories of organizations the user belongs to
    #[serde(default = "default_true")]
    pub org_member: bool,

    /// Include repositories starred by the user
    #[serde(default = "default_true")]
    pub starred: bool,

    /// Exclusion patterns: `owner/name` or `owner`
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// GitLab job configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GitLabConfig {
    /// Display name, also the directory the job's repositories land in
    #[serde(default = "default_gitlab_job_name")]
    pub job_name: String,

    /// Personal access token (`${VAR}` is expanded)
    pub access_token: String,

    /// Self-hosted instance URL
    #[serde(default)]
    pub url: Option<String>,

    /// Include projects starred by the user
    #[serde(default = "default_true")]
    pub starred: bool,

    /// Include projects owned by the user
    #[serde(default = "default_true")]
    pub owned: bool,

    /// Include projects the user is a member of
    #[serde(default = "default_true")]
    pub member: bool,

    /// Exclusion patterns: `owner/name` or `owner`
    #[serde(default)]
    pub exclude: Vec<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_github_job_name() -> String {
    "GitHub".to_string()
}
fn default_gitlab_job_name() -> String {
    "GitLab".to_string()
}

impl GitHubConfig {
    /// A job with every flag at its default
    pub fn with_token(access_token: impl Into<String>) -> Self {
        Self {
            job_name: default_github_job_name(),
            access_token: access_token.into(),
            url: None,
            owned: default_true(),
            collaborator: default_true(),
            org_member: default_true(),
            starred: default_true(),
            exclude: Vec::new(),
        }
    }
}

impl GitLabConfig {
    /// A job with every flag at its default
    pub fn with_token(access_token: impl Into<String>) -> Self {
        Self {
            job_name: default_gitlab_job_name(),
            access_token: access_token.into(),
            url: None,
            starred: default_true(),
            owned: default_true(),
            member: default_true(),
            exclude: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_yaml(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Parse a YAML document and resolve every default
    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document is a config without jobs.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut config: Config = serde_yaml::from_str(content)?;
        config.resolve_defaults()?;
        Ok(config)
    }

    /// XDG location used when no config file sits in the working directory
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("git-backup").join("config.yml"))
    }

    /// Apply defaults serde cannot express: blank job names and `${VAR}` tokens
    pub fn resolve_defaults(&mut self) -> Result<()> {
        for job in &mut self.github {
            job.job_name = resolve_job_name(&job.job_name, default_github_job_name);
            job.access_token = expand_token(&job.access_token)
                .with_context(|| format!("Failed to expand access_token of job {}", job.job_name))?;
            job.url = normalize_url(job.url.take());
        }

        for job in &mut self.gitlab {
            job.job_name = resolve_job_name(&job.job_name, default_gitlab_job_name);
            job.access_token = expand_token(&job.access_token)
                .with_context(|| format!("Failed to expand access_token of job {}", job.job_name))?;
            job.url = normalize_url(job.url.take());
        }

        Ok(())
    }

    /// Total number of configured jobs
    pub fn job_count(&self) -> usize {
        self.github.len() + self.gitlab.len()
    }

    /// Build one source per job: GitHub jobs first, then GitLab, in file order.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn sources(&self) -> crate::Result<Vec<Box<dyn RepositorySource>>> {
        let mut sources: Vec<Box<dyn RepositorySource>> = Vec::with_capacity(self.job_count());

        for job in &self.github {
            sources.push(Box::new(GitHubSource::new(job)?));
        }
        for job in &self.gitlab {
            sources.push(Box::new(GitLabSource::new(job)?));
        }

        Ok(sources)
    }
}

fn resolve_job_name(name: &str, default: fn() -> String) -> String {
    let name = name.trim();
    if name.is_empty() {
        default()
    } else {
        name.to_string()
    }
}

fn expand_token(token: &str) -> Result<String> {
    Ok(shellexpand::env(token.trim())?.trim().to_string())
}

fn normalize_url(url: Option<String>) -> Option<String> {
    url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())
}
