//! Git operations wrapper
//!
//! Read-only inspection of submodule checkouts goes through git2 (libgit2
//! bindings). Anything that talks to a remote or moves a work tree shells out
//! to the `git` executable through [`GitRunner`].

pub mod apply;
pub mod probe;
pub mod runner;
pub mod sparse;

pub use apply::{Applier, ApplyOptions, ApplyOutcome, CheckoutError};
pub use probe::{GitProbe, ProbeError, RepositoryProbe, SubmoduleState};
pub use runner::{GitRunner, ShellGit};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during git operations
#[derive(Error, Debug)]
pub enum GitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("git executable not found in PATH")]
    GitNotFound,
}

/// Whether `path` carries its own git metadata (a `.git` directory or gitlink file).
///
/// A directory inside the parent's work tree without this is not a checkout,
/// even though `Repository::discover` would happily find the parent.
pub fn has_git_metadata<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().join(".git").exists()
}

/// Locate the `git` executable.
pub fn find_git() -> Result<PathBuf, GitError> {
    which::which("git").map_err(|_| GitError::GitNotFound)
}
