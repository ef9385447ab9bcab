//! Shelling out to `git`
//!
//! The sync engine never runs git directly. It talks to a [`GitRunner`],
//! which hands back raw text for the engine to parse. [`ShellGit`] is the
//! real implementation; tests substitute an in-memory one.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

use super::GitError;
use crate::util::{describe_cmd, log_cmd, retry_with_backoff, RetryOptions};

/// Git capability required by the sync engine.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Clone `url` into `dest`. With `no_checkout` the work tree stays empty.
    async fn clone_repo(&self, url: &str, dest: &Path, no_checkout: bool) -> Result<(), GitError>;

    /// Fetch tags plus `refspecs` from `url` into `repo`.
    async fn fetch(&self, repo: &Path, url: &str, refspecs: &[String]) -> Result<(), GitError>;

    /// Detach `repo` at `commit`.
    async fn checkout(&self, repo: &Path, commit: &str, force: bool) -> Result<(), GitError>;

    /// `git ls-remote` listing of `url`.
    async fn ls_remote(&self, url: &str) -> Result<String, GitError>;

    /// `git show-ref -d` listing of `repo`. Empty when the repo has no refs.
    async fn show_ref(&self, repo: &Path) -> Result<String, GitError>;

    /// Full commit id `rev` names in `repo`, if the object is present.
    async fn rev_parse(&self, repo: &Path, rev: &str) -> Result<Option<String>, GitError>;

    /// Set a repository-local config value.
    async fn config_set(&self, repo: &Path, key: &str, value: &str) -> Result<(), GitError>;

    /// Absolute path of the git directory backing `repo`.
    async fn git_dir(&self, repo: &Path) -> Result<PathBuf, GitError>;

    /// Work tree of the repository `root` is a submodule of, if any.
    async fn superproject(&self, root: &Path) -> Result<Option<PathBuf>, GitError>;
}

/// [`GitRunner`] backed by the `git` executable.
///
/// Commands that touch the network are bounded by `timeout` and retried on
/// transient transport errors. Local commands are neither.
#[derive(Debug, Clone)]
pub struct ShellGit {
    timeout: Duration,
    retry: RetryOptions,
}

impl ShellGit {
    pub fn new(timeout: Duration, retry: RetryOptions) -> Self {
        Self { timeout, retry }
    }

    fn command(dir: Option<&Path>) -> Command {
        let mut cmd = Command::new("git");
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        // Never block on a credential prompt; a missing credential is a failure.
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn run_local(&self, mut cmd: Command) -> Result<(String, Output), GitError> {
        log_cmd(cmd.as_std());
        let command = describe_cmd(cmd.as_std());
        let output = cmd.output().await?;
        Ok((command, output))
    }

    async fn run_network(&self, mut cmd: Command) -> Result<Output, GitError> {
        log_cmd(cmd.as_std());
        let command = describe_cmd(cmd.as_std());
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(GitError::Timeout {
                    command,
                    seconds: self.timeout.as_secs(),
                })
            }
        };
        ensure_success(command, output)
    }
}

fn ensure_success(command: String, output: Output) -> Result<Output, GitError> {
    if output.status.success() {
        return Ok(output);
    }
    Err(GitError::CommandFailed {
        command,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

fn stdout_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[async_trait]
impl GitRunner for ShellGit {
    async fn clone_repo(&self, url: &str, dest: &Path, no_checkout: bool) -> Result<(), GitError> {
        let mut cmd = Self::command(None);
        cmd.args(["clone", "--quiet"]);
        if no_checkout {
            cmd.arg("--no-checkout");
        }
        cmd.arg(url).arg(dest);
        self.run_network(cmd).await.map(|_| ())
    }

    async fn fetch(&self, repo: &Path, url: &str, refspecs: &[String]) -> Result<(), GitError> {
        retry_with_backoff(&self.retry, move || async move {
            let mut cmd = Self::command(Some(repo));
            cmd.args(["fetch", "--quiet", "--tags", url]).args(refspecs);
            self.run_network(cmd).await.map(|_| ())
        })
        .await
    }

    async fn checkout(&self, repo: &Path, commit: &str, force: bool) -> Result<(), GitError> {
        let mut cmd = Self::command(Some(repo));
        cmd.args(["-c", "advice.detachedHead=false", "checkout", "--quiet", "--detach"]);
        if force {
            cmd.arg("--force");
        }
        cmd.arg(commit);
        let (command, output) = self.run_local(cmd).await?;
        ensure_success(command, output).map(|_| ())
    }

    async fn ls_remote(&self, url: &str) -> Result<String, GitError> {
        retry_with_backoff(&self.retry, move || async move {
            let mut cmd = Self::command(None);
            cmd.args(["ls-remote", url]);
            let output = self.run_network(cmd).await?;
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
        .await
    }

    async fn show_ref(&self, repo: &Path) -> Result<String, GitError> {
        let mut cmd = Self::command(Some(repo));
        cmd.args(["show-ref", "-d"]);
        let (command, output) = self.run_local(cmd).await?;
        // show-ref exits 1 with no output when there are no refs at all
        if output.status.code() == Some(1) && output.stdout.is_empty() {
            return Ok(String::new());
        }
        let output = ensure_success(command, output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn rev_parse(&self, repo: &Path, rev: &str) -> Result<Option<String>, GitError> {
        let mut cmd = Self::command(Some(repo));
        cmd.args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("{}^{{commit}}", rev));
        let (_, output) = self.run_local(cmd).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let sha = stdout_line(&output);
        Ok((!sha.is_empty()).then_some(sha))
    }

    async fn config_set(&self, repo: &Path, key: &str, value: &str) -> Result<(), GitError> {
        let mut cmd = Self::command(Some(repo));
        cmd.args(["config", key, value]);
        let (command, output) = self.run_local(cmd).await?;
        ensure_success(command, output).map(|_| ())
    }

    async fn git_dir(&self, repo: &Path) -> Result<PathBuf, GitError> {
        let mut cmd = Self::command(Some(repo));
        cmd.args(["rev-parse", "--absolute-git-dir"]);
        let (command, output) = self.run_local(cmd).await?;
        let output = ensure_success(command, output)?;
        Ok(PathBuf::from(stdout_line(&output)))
    }

    async fn superproject(&self, root: &Path) -> Result<Option<PathBuf>, GitError> {
        let mut cmd = Self::command(Some(root));
        cmd.args(["rev-parse", "--show-superproject-working-tree"]);
        let (command, output) = self.run_local(cmd).await?;
        let output = ensure_success(command, output)?;
        let path = stdout_line(&output);
        Ok((!path.is_empty()).then(|| PathBuf::from(path)))
    }
}
