//! Carrying out planned sync actions
//!
//! Every mutation is confined to the submodule's own directory. The parent's
//! tracked files, index and `.gitmodules` are never written.

use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{sparse, GitError, GitRunner};
use crate::core::manifest::SubmoduleRequirement;
use crate::core::plan::SyncAction;
use crate::core::revision::{resolve_fxtag, ResolveError, ResolvedRevision, RevisionKind};
use crate::util::{retry_with_backoff, RetryOptions};

/// Why a submodule could not be brought to its pinned revision
#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("cannot reach remote: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("revision not found: {0}")]
    MissingRef(String),

    #[error("{0}")]
    AmbiguousRef(String),

    #[error("timed out after {seconds}s: {command}")]
    Timeout { command: String, seconds: u64 },

    #[error("{0} has local modifications, use --force to discard them")]
    LocalChanges(String),

    #[error("sparse checkout file {0} not found")]
    SparseFile(String),

    #[error("git failed: {0}")]
    Git(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckoutError {
    /// Short machine-readable category, used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::Network(_) => "network",
            CheckoutError::Auth(_) => "auth",
            CheckoutError::MissingRef(_) => "missing-ref",
            CheckoutError::AmbiguousRef(_) => "ambiguous-ref",
            CheckoutError::Timeout { .. } => "timeout",
            CheckoutError::LocalChanges(_) => "local-changes",
            CheckoutError::SparseFile(_) => "sparse",
            CheckoutError::Git(_) => "git",
            CheckoutError::Io(_) => "io",
        }
    }
}

const AUTH_PATTERNS: &[&str] = &[
    "authentication failed",
    "permission denied",
    "could not read username",
    "terminal prompts disabled",
    "invalid username or password",
    "returned error: 403",
];

const NETWORK_PATTERNS: &[&str] = &[
    "could not resolve host",
    "unable to access",
    "could not read from remote repository",
    "connection refused",
    "connection reset",
    "connection timed out",
    "network is unreachable",
    "early eof",
    "the remote end hung up",
    "repository not found",
    "does not appear to be a git repository",
    "does not exist",
];

const MISSING_REF_PATTERNS: &[&str] = &[
    "couldn't find remote ref",
    "did not match any",
    "unknown revision",
    "reference is not a tree",
    "not our ref",
    "bad object",
];

/// Classify git's stderr into a [`CheckoutError`].
fn classify_failure(command: String, stderr: String) -> CheckoutError {
    let lower = stderr.to_lowercase();
    let detail = if stderr.is_empty() { command } else { stderr };
    let any = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if any(AUTH_PATTERNS) {
        CheckoutError::Auth(detail)
    } else if any(NETWORK_PATTERNS) {
        CheckoutError::Network(detail)
    } else if any(MISSING_REF_PATTERNS) {
        CheckoutError::MissingRef(detail)
    } else if lower.contains("would be overwritten") {
        CheckoutError::LocalChanges(detail)
    } else {
        CheckoutError::Git(detail)
    }
}

impl From<GitError> for CheckoutError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::CommandFailed { command, stderr } => classify_failure(command, stderr),
            GitError::Timeout { command, seconds } => CheckoutError::Timeout { command, seconds },
            GitError::Io(e) => CheckoutError::Io(e),
            other => CheckoutError::Git(other.to_string()),
        }
    }
}

impl From<ResolveError> for CheckoutError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Ambiguous { .. } => CheckoutError::AmbiguousRef(err.to_string()),
            ResolveError::NotFound { .. } => CheckoutError::MissingRef(err.to_string()),
            ResolveError::Git(e) => e.into(),
        }
    }
}

/// Knobs for [`Applier`]
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Discard local modifications when moving a checkout
    pub force: bool,
    /// Backoff for clones
    pub retry: RetryOptions,
    /// Precedence used to resolve `fxtag` after cloning
    pub order: Vec<RevisionKind>,
}

/// What applying an action changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Cloned and checked out at `commit`
    Created { commit: String },
    /// Moved from `from` to `to`
    Updated { from: Option<String>, to: String },
    /// Already at the pinned revision
    Unchanged,
    /// Not required in this context
    Skipped,
}

/// Executes [`SyncAction`]s through a [`GitRunner`].
pub struct Applier<'a> {
    root: &'a Path,
    git: &'a dyn GitRunner,
    options: &'a ApplyOptions,
}

impl<'a> Applier<'a> {
    pub fn new(root: &'a Path, git: &'a dyn GitRunner, options: &'a ApplyOptions) -> Self {
        Self { root, git, options }
    }

    /// Apply one action to one submodule.
    pub async fn apply(
        &self,
        requirement: &SubmoduleRequirement,
        action: &SyncAction,
    ) -> Result<ApplyOutcome, CheckoutError> {
        match action {
            SyncAction::Skip => Ok(ApplyOutcome::Skipped),
            SyncAction::NoOp { .. } => Ok(ApplyOutcome::Unchanged),
            SyncAction::Clone => self.clone_submodule(requirement).await,
            SyncAction::CheckoutTag {
                target,
                from,
                dirty,
            } => {
                self.move_checkout(requirement, target, from.clone(), *dirty)
                    .await
            }
        }
    }

    async fn clone_submodule(
        &self,
        requirement: &SubmoduleRequirement,
    ) -> Result<ApplyOutcome, CheckoutError> {
        let dest = requirement.absolute_path(self.root);
        let created = !dest.exists();
        tokio::fs::create_dir_all(&dest).await?;
        let reclaimable = created || is_empty_dir(&dest).await;

        // A missing pattern file fails before any network traffic.
        let patterns = match requirement.fxsparse.as_deref() {
            Some(fxsparse) => match sparse::read_patterns(&dest, fxsparse).await {
                Ok(patterns) => Some(patterns),
                Err(e) => {
                    if created {
                        discard(&dest, Cleanup::Remove).await;
                    }
                    return Err(e);
                }
            },
            None => None,
        };

        let url = requirement.clone_url();
        info!(submodule = %requirement.name, %url, path = %dest.display(), "Cloning");

        let (url_ref, dest_ref, no_checkout) = (url.as_str(), dest.as_path(), patterns.is_some());
        let git = self.git;
        let cloned = retry_with_backoff(&self.options.retry, move || async move {
            let result = git.clone_repo(url_ref, dest_ref, no_checkout).await;
            if result.is_err() && reclaimable {
                discard(dest_ref, Cleanup::Empty).await;
            }
            result
        })
        .await;

        let finished = match cloned {
            Ok(()) => self.finish_clone(requirement, &dest, patterns.as_deref()).await,
            Err(e) => Err(e.into()),
        };

        match finished {
            Ok(commit) => Ok(ApplyOutcome::Created { commit }),
            Err(e) => {
                // No partial repository is left behind.
                if created {
                    discard(&dest, Cleanup::Remove).await;
                } else if reclaimable {
                    discard(&dest, Cleanup::Empty).await;
                }
                Err(e)
            }
        }
    }

    /// Everything after `git clone`: sparse setup, resolution, first checkout.
    async fn finish_clone(
        &self,
        requirement: &SubmoduleRequirement,
        dest: &Path,
        patterns: Option<&str>,
    ) -> Result<String, CheckoutError> {
        if let (Some(fxsparse), Some(patterns)) = (requirement.fxsparse.as_deref(), patterns) {
            sparse::configure(self.git, dest, fxsparse, patterns).await?;
        }

        let target = resolve_fxtag(self.git, requirement, Some(dest), &self.options.order).await?;
        let commit = self.ensure_commit(requirement, dest, &target).await?;
        self.git.checkout(dest, &commit, false).await?;
        Ok(commit)
    }

    async fn move_checkout(
        &self,
        requirement: &SubmoduleRequirement,
        target: &ResolvedRevision,
        from: Option<String>,
        dirty: bool,
    ) -> Result<ApplyOutcome, CheckoutError> {
        if dirty && !self.options.force {
            return Err(CheckoutError::LocalChanges(requirement.path.clone()));
        }

        let dest = requirement.absolute_path(self.root);
        let commit = self.ensure_commit(requirement, &dest, target).await?;

        // Rewritten on every move, including checkouts cloned before `fxsparse` was set.
        if let Some(fxsparse) = requirement.fxsparse.as_deref() {
            let patterns = sparse::read_patterns(&dest, fxsparse).await?;
            sparse::configure(self.git, &dest, fxsparse, &patterns).await?;
        }

        info!(submodule = %requirement.name, from = ?from, to = %commit, "Checking out");
        self.git.checkout(&dest, &commit, self.options.force).await?;

        Ok(ApplyOutcome::Updated { from, to: commit })
    }

    /// Make sure the target commit is present locally, fetching from `fxurl`
    /// if needed. Returns the full commit id.
    async fn ensure_commit(
        &self,
        requirement: &SubmoduleRequirement,
        dir: &Path,
        target: &ResolvedRevision,
    ) -> Result<String, CheckoutError> {
        if let Some(full) = self.local_commit(dir, target).await? {
            return Ok(full);
        }

        debug!(submodule = %requirement.name, commit = %target.commit, "Commit not present, fetching");
        let refspecs = fetch_refspecs(target, &requirement.fxtag);
        self.git.fetch(dir, &requirement.fxurl, &refspecs).await?;

        self.local_commit(dir, target).await?.ok_or_else(|| {
            CheckoutError::MissingRef(format!(
                "'{}' ({}) not found in {}",
                requirement.fxtag, target.commit, requirement.fxurl
            ))
        })
    }

    async fn local_commit(
        &self,
        dir: &Path,
        target: &ResolvedRevision,
    ) -> Result<Option<String>, GitError> {
        Ok(self
            .git
            .rev_parse(dir, &target.commit)
            .await?
            .filter(|full| target.matches(full)))
    }
}

/// Refspecs that bring `target` into a clone when it is not there yet.
fn fetch_refspecs(target: &ResolvedRevision, rev: &str) -> Vec<String> {
    match target.kind {
        // `git fetch --tags` already covers tags
        RevisionKind::Tag => Vec::new(),
        RevisionKind::Branch => vec![format!("+refs/heads/{rev}:refs/remotes/fleximod/{rev}")],
        RevisionKind::Commit => vec!["+refs/heads/*:refs/remotes/fleximod/*".to_string()],
    }
}

async fn is_empty_dir(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}

#[derive(Debug, Clone, Copy)]
enum Cleanup {
    /// Delete the directory; it did not exist before the clone
    Remove,
    /// Keep the directory but empty it; it existed, empty, before the clone
    Empty,
}

/// Drop whatever a failed clone left behind. Failures here are logged only;
/// the clone error is what gets reported.
async fn discard(path: &Path, cleanup: Cleanup) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Could not remove failed clone");
        }
    }
    if let Cleanup::Empty = cleanup {
        if let Err(e) = tokio::fs::create_dir_all(path).await {
            warn!(path = %path.display(), error = %e, "Could not recreate submodule directory");
        }
    }
}
