//! Read-only inspection of submodule checkouts

use git2::{ErrorCode, Repository, Status, StatusOptions};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use super::has_git_metadata;

/// Length of abbreviated commit ids shown to users
pub const DEFAULT_SHORT_ID_LEN: usize = 7;

/// Errors raised while inspecting a checkout
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("cannot read repository at {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: git2::Error,
    },
}

/// What is on disk at a submodule path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmoduleState {
    /// The path holds a git checkout of its own
    pub exists: bool,
    /// Full commit id of HEAD; `None` when absent or unborn
    pub head: Option<String>,
    /// HEAD abbreviated for display
    pub current_commit: Option<String>,
    /// Tracked files differ from HEAD
    pub dirty: bool,
}

impl SubmoduleState {
    /// Nothing checked out
    pub fn absent() -> Self {
        Self::default()
    }

    /// A checkout at `head`
    pub fn checked_out(head: Option<String>, dirty: bool, short_id_len: usize) -> Self {
        let current_commit = head
            .as_deref()
            .map(|sha| sha.chars().take(short_id_len).collect());
        Self {
            exists: true,
            head,
            current_commit,
            dirty,
        }
    }
}

/// Reports the state of a path without changing it.
pub trait RepositoryProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<SubmoduleState, ProbeError>;
}

/// [`RepositoryProbe`] backed by libgit2
#[derive(Debug, Clone)]
pub struct GitProbe {
    short_id_len: usize,
}

impl GitProbe {
    pub fn new(short_id_len: usize) -> Self {
        Self { short_id_len }
    }
}

impl Default for GitProbe {
    fn default() -> Self {
        Self::new(DEFAULT_SHORT_ID_LEN)
    }
}

impl RepositoryProbe for GitProbe {
    fn probe(&self, path: &Path) -> Result<SubmoduleState, ProbeError> {
        if !has_git_metadata(path) {
            return Ok(SubmoduleState::absent());
        }

        let unreadable = |source: git2::Error| ProbeError::Unreadable {
            path: path.display().to_string(),
            source,
        };

        let repo = Repository::open(path).map_err(unreadable)?;

        let head = match repo.head() {
            Ok(reference) => Some(reference.peel_to_commit().map_err(unreadable)?.id().to_string()),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(e) => return Err(unreadable(e)),
        };

        let dirty = has_local_modifications(&repo).map_err(unreadable)?;

        Ok(SubmoduleState::checked_out(head, dirty, self.short_id_len))
    }
}

/// Tracked changes, staged or not. Untracked files and nested submodules are ignored.
fn has_local_modifications(repo: &Repository) -> Result<bool, git2::Error> {
    // libgit2 reports skip-worktree files of a sparse checkout as deleted
    let sparse = repo
        .config()
        .and_then(|c| c.get_bool("core.sparseCheckout"))
        .unwrap_or(false);

    let mut opts = StatusOptions::new();
    opts.include_untracked(false)
        .include_ignored(false)
        .exclude_submodules(true);

    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(statuses.iter().any(|entry| {
        let status = entry.status();
        if sparse && status == Status::WT_DELETED {
            return false;
        }
        status != Status::CURRENT && !status.contains(Status::IGNORED)
    }))
}
