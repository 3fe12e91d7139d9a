//! Error kinds surfaced by sources, the sync engine and the orchestrator.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause carried by provider errors (octocrab, reqwest, url parsing).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while backing up repositories.
#[derive(Error, Debug)]
pub enum Error {
    /// The identity probe of a source failed. Listing is never attempted.
    #[error("Failed to verify connection to job [{job}]: {cause}")]
    Authentication {
        job: String,
        #[source]
        cause: BoxError,
    },

    /// A listing request failed. Partial results are discarded.
    #[error("Communication error for job [{job}]: {cause}")]
    Communication {
        job: String,
        #[source]
        cause: BoxError,
    },

    /// Clone, open, pull or fetch failed for one repository.
    #[error("Failed to sync {repository}: {message}")]
    Sync { repository: String, message: String },

    /// The target directory for a repository could not be prepared.
    #[error("Failed to prepare directory '{path}': {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configured job could not build its API client.
    #[error("Invalid source [{job}]: {message}")]
    InvalidSource { job: String, message: String },
}

impl Error {
    pub(crate) fn authentication(job: &str, cause: impl Into<BoxError>) -> Self {
        Error::Authentication {
            job: job.to_string(),
            cause: cause.into(),
        }
    }

    pub(crate) fn communication(job: &str, cause: impl Into<BoxError>) -> Self {
        Error::Communication {
            job: job.to_string(),
            cause: cause.into(),
        }
    }

    pub(crate) fn sync(repository: &str, message: impl Into<String>) -> Self {
        Error::Sync {
            repository: repository.to_string(),
            message: message.into(),
        }
    }

    /// Process exit code the command line maps this error to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Authentication { .. } => 110,
            Error::Communication { .. } | Error::Sync { .. } | Error::Filesystem { .. } => 100,
            Error::InvalidSource { .. } => 1,
        }
    }
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
