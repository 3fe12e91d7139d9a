use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::repository::Repository;

const ORIGIN: &str = "origin";

/// Terminal classification of one repository synchronization
#[derive(Debug)]
pub enum SyncOutcome {
    /// Cloned, or new data was fetched into an existing copy
    Success,
    /// The remote has no refs; a valid empty repository is left in place
    SuccessEmptyRemote,
    /// Nothing changed locally
    SuccessAlreadyUpToDate,
    /// Clone, open, pull or fetch failed
    Failure(Error),
}

/// Result of `git clone`, classified once where the process returns
#[derive(Debug, Clone, PartialEq, Eq)]
enum CloneOutcome {
    Cloned,
    EmptyRemote,
    AlreadyExists,
    Failed(String),
}

/// Result of `git pull --ff-only`
#[derive(Debug, Clone, PartialEq, Eq)]
enum PullOutcome {
    Updated,
    UpToDate,
    /// The current branch tracks nothing
    NoUpstream,
    /// The tracked branch is not on the remote (empty remote, deleted or renamed branch)
    UpstreamMissing,
    Failed(String),
}

/// Captured output of one git invocation
struct GitOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn success(&self) -> bool {
        self.status.success()
    }

    fn message(&self, action: &str) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("git {} exited with {}", action, self.status)
    }
}

/// Set of `<object id> <ref name>` lines describing every local ref
type RefSnapshot = BTreeSet<String>;

/// Failure message of an engine step, before redaction
type Step<T> = std::result::Result<T, String>;

/// Drives the `git` executable to mirror remote repositories
#[derive(Debug, Clone)]
pub struct GitClient {
    program: PathBuf,
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitClient {
    /// Use the `git` found on `PATH`
    pub fn new() -> Self {
        Self::with_program("git")
    }

    /// Use a specific git executable
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Ensure `path` holds an up-to-date copy of `repo`.
    ///
    /// `bare` only applies to fresh clones; an existing copy keeps its
    /// shape. Never returns an error: every problem becomes
    /// [`SyncOutcome::Failure`] with the token redacted from the message.
    pub async fn clone_or_update(&self, repo: &Repository, path: &Path, bare: bool) -> SyncOutcome {
        match self.mirror(repo, path, bare).await {
            Ok(outcome) => outcome,
            Err(message) => {
                let message = repo.redact(&message);
                debug!("git failed for {}: {}", repo, message);
                SyncOutcome::Failure(Error::sync(repo.full_name(), message))
            }
        }
    }

    async fn mirror(&self, repo: &Repository, path: &Path, bare: bool) -> Step<SyncOutcome> {
        match self.clone(repo, path, bare).await? {
            CloneOutcome::Cloned => {
                info!("Cloned {} into {}", repo, path.display());
                let remotes = self.remotes(path).await?;
                self.fetch_remotes(path, &remotes, bare).await?;
                Ok(SyncOutcome::Success)
            }
            CloneOutcome::EmptyRemote => {
                info!("Cloned empty repository {} into {}", repo, path.display());
                Ok(SyncOutcome::SuccessEmptyRemote)
            }
            CloneOutcome::AlreadyExists => self.update(repo, path).await,
            CloneOutcome::Failed(message) => Err(message),
        }
    }

    async fn update(&self, repo: &Repository, path: &Path) -> Step<SyncOutcome> {
        self.open(path).await?;
        let bare = self.is_bare(path).await?;
        debug!(
            "Updating {} repository {} at {}",
            if bare { "bare" } else { "working tree" },
            repo,
            path.display()
        );

        let before = self.snapshot_refs(path).await?;
        let remotes = self.remotes(path).await?;

        if remotes.iter().any(|r| r == ORIGIN) {
            self.set_origin_url(repo, path).await?;
        }

        // A bare mirror has no working tree to fast-forward.
        let pulled = if bare {
            None
        } else {
            let pull = self.pull(path).await?;
            match &pull {
                PullOutcome::Updated => debug!("Fast-forwarded {}", repo),
                PullOutcome::UpToDate => debug!("Working tree of {} already up to date", repo),
                PullOutcome::NoUpstream => debug!("No upstream branch for {}, skipping pull", repo),
                PullOutcome::UpstreamMissing => debug!("Upstream branch of {} not on the remote", repo),
                PullOutcome::Failed(message) => return Err(message.clone()),
            }
            Some(pull)
        };

        self.fetch_remotes(path, &remotes, bare).await?;

        let after = self.snapshot_refs(path).await?;
        if upstream_vanished(pulled.as_ref(), &after) {
            warn!(
                "Upstream branch of {} no longer exists on the remote, working tree left on its current branch",
                repo
            );
        }

        let outcome = classify_refresh(&before, &after);
        info!("Updated {}: {:?}", repo, outcome);
        Ok(outcome)
    }

    async fn clone(&self, repo: &Repository, path: &Path, bare: bool) -> Step<CloneOutcome> {
        let mut args: Vec<&OsStr> = vec![OsStr::new("clone")];
        if bare {
            args.push(OsStr::new("--bare"));
        }
        args.push(OsStr::new(repo.git_url().as_str()));
        args.push(path.as_os_str());

        let output = self.run(None, args).await?;
        Ok(classify_clone(output.success(), &output.message("clone")))
    }

    /// The directory must be the top of a repository, not merely inside one.
    async fn open(&self, path: &Path) -> Step<()> {
        let output = self.run(Some(path), ["rev-parse", "--git-dir"]).await?;
        if !output.success() {
            return Err(output.message("rev-parse"));
        }

        match output.stdout.trim() {
            "." | ".git" => Ok(()),
            _ => Err(format!("{} is not a git repository", path.display())),
        }
    }

    async fn is_bare(&self, path: &Path) -> Step<bool> {
        let output = self
            .run(Some(path), ["config", "--bool", "core.bare"])
            .await?;

        if output.success() {
            Ok(output.stdout.trim() == "true")
        } else if output.status.code() == Some(1) {
            // Key not set
            Ok(false)
        } else {
            Err(output.message("config"))
        }
    }

    async fn snapshot_refs(&self, path: &Path) -> Step<RefSnapshot> {
        let output = self
            .run(
                Some(path),
                ["for-each-ref", "--format=%(objectname) %(refname)"],
            )
            .await?;

        if !output.success() {
            return Err(output.message("for-each-ref"));
        }

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn remotes(&self, path: &Path) -> Step<Vec<String>> {
        let output = self.run(Some(path), ["remote"]).await?;
        if !output.success() {
            return Err(output.message("remote"));
        }

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Point `origin` at the freshly authenticated URL (rotated tokens).
    async fn set_origin_url(&self, repo: &Repository, path: &Path) -> Step<()> {
        let output = self
            .run(
                Some(path),
                ["remote", "set-url", ORIGIN, repo.git_url().as_str()],
            )
            .await?;

        if output.success() {
            Ok(())
        } else {
            Err(output.message("remote set-url"))
        }
    }

    async fn pull(&self, path: &Path) -> Step<PullOutcome> {
        let output = self.run(Some(path), ["pull", "--ff-only"]).await?;
        Ok(classify_pull(
            output.success(),
            &output.stdout,
            &output.message("pull"),
        ))
    }

    /// Fetch every remote with forced refspecs; the first failure aborts.
    async fn fetch_remotes(&self, path: &Path, remotes: &[String], bare: bool) -> Step<()> {
        for remote in remotes {
            let mut args: Vec<String> = vec!["fetch".to_string()];
            if bare && remote == ORIGIN {
                args.push("--update-head-ok".to_string());
            }
            args.push(remote.clone());
            args.extend(fetch_refspecs(remote, bare));

            debug!("Fetching remote {} in {}", remote, path.display());
            let output = self.run(Some(path), &args).await?;
            if !output.success() {
                return Err(format!(
                    "fetch from remote {} failed: {}",
                    remote,
                    output.message("fetch")
                ));
            }
        }

        Ok(())
    }

    async fn run<I, S>(&self, dir: Option<&Path>, args: I) -> Step<GitOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = AsyncCommand::new(&self.program);
        command
            .args(args)
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = dir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.program.display(), e))?;

        Ok(GitOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn classify_clone(success: bool, message: &str) -> CloneOutcome {
    if success {
        if message.contains("cloned an empty repository") {
            CloneOutcome::EmptyRemote
        } else {
            CloneOutcome::Cloned
        }
    } else if message.contains("already exists and is not an empty directory") {
        CloneOutcome::AlreadyExists
    } else {
        CloneOutcome::Failed(message.to_string())
    }
}

fn classify_pull(success: bool, stdout: &str, message: &str) -> PullOutcome {
    if success {
        if stdout.contains("Already up to date") || stdout.contains("Already up-to-date") {
            PullOutcome::UpToDate
        } else {
            PullOutcome::Updated
        }
    } else if message.contains("couldn't find remote ref")
        || message.contains("no such ref was fetched")
    {
        PullOutcome::UpstreamMissing
    } else if message.contains("There is no tracking information") {
        PullOutcome::NoUpstream
    } else {
        PullOutcome::Failed(message.to_string())
    }
}

/// Forced refspecs for heads and tags of `remote`.
///
/// A bare repository mirrors `origin` heads onto its own branches.
fn fetch_refspecs(remote: &str, bare: bool) -> [String; 2] {
    let heads = if bare && remote == ORIGIN {
        "+refs/heads/*:refs/heads/*".to_string()
    } else {
        format!("+refs/heads/*:refs/remotes/{}/*", remote)
    };
    [heads, "+refs/tags/*:refs/tags/*".to_string()]
}

/// A missing upstream is only expected while the repository is empty.
fn upstream_vanished(pull: Option<&PullOutcome>, after: &RefSnapshot) -> bool {
    matches!(pull, Some(PullOutcome::UpstreamMissing)) && !after.is_empty()
}

fn classify_refresh(before: &RefSnapshot, after: &RefSnapshot) -> SyncOutcome {
    if after.is_empty() {
        SyncOutcome::SuccessEmptyRemote
    } else if before == after {
        SyncOutcome::SuccessAlreadyUpToDate
    } else {
        SyncOutcome::Success
    }
}
