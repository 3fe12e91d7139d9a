//! git-backup - Incremental mirror backups of GitHub and GitLab repositories
//!
//! Each configured job lists the repositories an account can see and keeps a
//! local copy of every one of them up to date. Re-running against an existing
//! backup directory is the normal case: existing copies are opened and
//! refreshed, never treated as a collision.
//!
//! ## Modules
//!
//! - [`config`]: YAML job configuration
//! - [`source`]: the provider-agnostic [`RepositorySource`] trait
//! - [`github`] / [`gitlab`]: provider listings
//! - [`repository`]: the repository entity and exclusion filtering
//! - [`git`]: clone-or-update engine driving the `git` executable
//! - [`sync`]: orchestration across jobs

pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod gitlab;
pub mod repository;
pub mod source;
pub mod sync;

pub use config::{Config, GitHubConfig, GitLabConfig};
pub use error::{Error, Result};
pub use git::{GitClient, SyncOutcome};
pub use github::GitHubSource;
pub use gitlab::GitLabSource;
pub use repository::{is_excluded, Repository};
pub use source::RepositorySource;
pub use sync::{SyncEngine, SyncOptions, SyncSummary};
