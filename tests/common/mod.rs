//! Common test utilities: local git fixtures for the mirror tests

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use url::Url;

use git_backup::Repository;

/// Mirror tests are skipped on machines without a git executable
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Run git with a fixed identity and return stdout; panics on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Backup Test",
            "-c",
            "user.email=backup@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("Failed to execute git");

    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );

    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A bare "remote" repository living in a temp directory
pub struct RemoteFixture {
    pub root: TempDir,
    pub path: PathBuf,
}

impl RemoteFixture {
    /// A remote without any refs, HEAD pointing at `main`
    pub fn empty(name: &str) -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let path = root.path().join(format!("{}.git", name));

        git(root.path(), &["init", "--quiet", "--bare", path.to_str().unwrap()]);
        git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        Self { root, path }
    }

    /// A remote with one commit on `main`
    pub fn seeded(name: &str) -> Self {
        let remote = Self::empty(name);
        remote.commit("README.md", "hello\n");
        remote
    }

    /// Push a commit writing `content` to `file` on `main`
    pub fn commit(&self, file: &str, content: &str) {
        let scratch = TempDir::new().expect("Failed to create scratch dir");
        let work = scratch.path().join("work");

        git(
            scratch.path(),
            &["clone", "--quiet", self.url().as_str(), work.to_str().unwrap()],
        );
        std::fs::write(work.join(file), content).expect("Failed to write fixture file");
        git(&work, &["add", file]);
        git(&work, &["commit", "--quiet", "-m", &format!("update {}", file)]);
        git(&work, &["push", "--quiet", "origin", "HEAD:refs/heads/main"]);
    }

    /// Replace the tip of `main` with an amended commit and force-push it
    pub fn rewrite(&self, file: &str, content: &str) {
        let scratch = TempDir::new().expect("Failed to create scratch dir");
        let work = scratch.path().join("work");

        git(
            scratch.path(),
            &["clone", "--quiet", self.url().as_str(), work.to_str().unwrap()],
        );
        std::fs::write(work.join(file), content).expect("Failed to write fixture file");
        git(&work, &["commit", "--quiet", "--amend", "-a", "-m", "rewritten"]);
        git(&work, &["push", "--quiet", "--force", "origin", "HEAD:refs/heads/main"]);
    }

    /// Rename `main` on the remote and make the new name its default branch
    pub fn rename_main(&self, branch: &str) {
        git(&self.path, &["branch", "-m", "main", branch]);
        git(
            &self.path,
            &["symbolic-ref", "HEAD", &format!("refs/heads/{}", branch)],
        );
    }

    /// Push an annotated tag on the current `main`
    pub fn tag(&self, name: &str) {
        git(&self.path, &["tag", "-a", name, "-m", name, "main"]);
    }

    /// Commit id of `main`
    pub fn head(&self) -> String {
        self.head_of("main")
    }

    pub fn head_of(&self, branch: &str) -> String {
        git(&self.path, &["rev-parse", &format!("refs/heads/{}", branch)])
    }

    pub fn url(&self) -> Url {
        Url::from_file_path(&self.path).expect("Fixture path must be absolute")
    }

    pub fn repository(&self, full_name: &str) -> Repository {
        Repository::new(self.url(), full_name)
    }
}
