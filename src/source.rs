//! Provider-agnostic source abstraction.
//!
//! Every configured job (a GitHub or GitLab account) becomes one
//! [`RepositorySource`]. The orchestrator only talks to this trait; each
//! implementation owns its pagination, filtering and credential embedding.

use async_trait::async_trait;

use crate::error::Result;
use crate::repository::Repository;

/// Something that can authenticate, name itself and enumerate repositories.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Job name, used for display and as the first directory level.
    fn name(&self) -> &str;

    /// Lightweight identity probe. Returns the authenticated login.
    async fn test(&self) -> Result<String>;

    /// Deduplicated, exclusion-filtered repositories to back up.
    async fn list_repositories(&self) -> Result<Vec<Repository>>;
}

/// Request size used by every paginated listing.
pub(crate) const PER_PAGE: u8 = 100;
