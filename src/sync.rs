//! Sync orchestration
//!
//! Walks every configured source in order: verify the connection, list the
//! repositories, then mirror each one under
//! `<backup root>/<job name>/<owner>/<name>` with the [`GitClient`].
//! Repositories are processed one at a time.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::git::{GitClient, SyncOutcome};
use crate::repository::Repository;
use crate::source::RepositorySource;

/// Run-wide settings taken from the command line
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Root of the mirror tree
    pub backup_root: PathBuf,
    /// Fresh clones are bare
    pub bare: bool,
    /// Keep going after a failed repository
    pub fail_at_end: bool,
}

/// Results from a complete backup run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSummary {
    pub repositories: usize,
    pub updated: usize,
    pub up_to_date: usize,
    pub empty: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl SyncSummary {
    fn record(&mut self, outcome: &SyncOutcome) {
        self.repositories += 1;
        match outcome {
            SyncOutcome::Success => self.updated += 1,
            SyncOutcome::SuccessAlreadyUpToDate => self.up_to_date += 1,
            SyncOutcome::SuccessEmptyRemote => self.empty += 1,
            SyncOutcome::Failure(_) => self.failed += 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Orchestrates sources and the git engine for one backup run
pub struct SyncEngine {
    git: GitClient,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(git: GitClient, options: SyncOptions) -> Self {
        Self { git, options }
    }

    /// Back up every repository of every source, in order.
    ///
    /// Authentication and listing errors abort the run. A failed repository
    /// aborts it too unless `fail_at_end` is set, in which case it is only
    /// counted in the summary.
    pub async fn run(&self, sources: &[Box<dyn RepositorySource>]) -> Result<SyncSummary> {
        let start_time = Instant::now();
        let mut summary = SyncSummary::default();

        for source in sources {
            let job = source.name();
            info!("Backing up job [{}]", job);

            let login = source.test().await?;
            debug!("Connection to job [{}] verified as {}", job, login);

            let repositories = source.list_repositories().await?;
            info!("Job [{}]: {} repositories to back up", job, repositories.len());

            for repo in &repositories {
                let outcome = self.backup(job, repo).await?;
                summary.record(&outcome);

                if let SyncOutcome::Failure(err) = outcome {
                    if !self.options.fail_at_end {
                        return Err(err);
                    }
                    error!("{}", err);
                }
            }
        }

        summary.duration = start_time.elapsed();

        info!(
            "Backup completed in {:.2}s: {} repositories, {} updated, {} up to date, {} empty, {} failed",
            summary.duration.as_secs_f64(),
            summary.repositories,
            summary.updated,
            summary.up_to_date,
            summary.empty,
            summary.failed
        );

        Ok(summary)
    }

    async fn backup(&self, job: &str, repo: &Repository) -> Result<SyncOutcome> {
        let path = target_path(&self.options.backup_root, job, repo.full_name())?;

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| Error::Filesystem {
                path: path.clone(),
                source,
            })?;

        debug!("Syncing {} into {}", repo, path.display());
        let outcome = self.git.clone_or_update(repo, &path, self.options.bare).await;

        match &outcome {
            SyncOutcome::Success => info!("{}: updated", repo),
            SyncOutcome::SuccessAlreadyUpToDate => info!("{}: already up to date", repo),
            SyncOutcome::SuccessEmptyRemote => info!("{}: empty remote", repo),
            SyncOutcome::Failure(_) => {}
        }

        Ok(outcome)
    }
}

/// `<root>/<job>/<segments of full name>`.
///
/// Empty, `.` and `..` segments are rejected so a provider name can never
/// escape the backup root.
pub fn target_path(root: &Path, job: &str, full_name: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();

    for segment in job.split('/').chain(full_name.split('/')) {
        let segment = segment.trim();
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return Err(Error::Filesystem {
                path: root.join(job).join(full_name),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsafe path segment in '{}/{}'", job, full_name),
                ),
            });
        }
        path.push(segment);
    }

    Ok(path)
}
