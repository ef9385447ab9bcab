//! In-memory git backend.
//!
//! Implements both [`GitRunner`] and [`RepositoryProbe`] over a table of fake
//! remotes and checkouts, and records every call so tests can assert which
//! operations ran (or that none did).

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use fleximod::cli::{SyncContext, SyncOptions};
use fleximod::core::manifest::{CheckoutContext, Manifest};
use fleximod::git::probe::{ProbeError, SubmoduleState, DEFAULT_SHORT_ID_LEN};
use fleximod::git::{GitError, GitRunner, RepositoryProbe};
use fleximod::util::RetryOptions;

/// A recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitOp {
    Clone { url: String, dest: PathBuf },
    Fetch { repo: PathBuf, url: String },
    Checkout { repo: PathBuf, commit: String, force: bool },
    LsRemote { url: String },
    ShowRef { repo: PathBuf },
    RevParse { repo: PathBuf, rev: String },
    ConfigSet { repo: PathBuf, key: String },
    GitDir { repo: PathBuf },
    Superproject { root: PathBuf },
}

impl GitOp {
    /// Whether the call changes anything on disk
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            GitOp::Clone { .. } | GitOp::Fetch { .. } | GitOp::Checkout { .. } | GitOp::ConfigSet { .. }
        )
    }
}

/// Refs published by a fake remote
#[derive(Debug, Clone, Default)]
pub struct FakeRemote {
    pub head: String,
    pub tags: Vec<(String, String)>,
    pub branches: Vec<(String, String)>,
}

impl FakeRemote {
    /// `main` at `head`, plus the given tags
    pub fn new(head: &str) -> Self {
        Self {
            head: head.to_string(),
            tags: Vec::new(),
            branches: vec![("main".to_string(), head.to_string())],
        }
    }

    pub fn tag(mut self, name: &str, commit: &str) -> Self {
        self.tags.push((name.to_string(), commit.to_string()));
        self
    }

    pub fn branch(mut self, name: &str, commit: &str) -> Self {
        self.branches.push((name.to_string(), commit.to_string()));
        self
    }

    /// `git ls-remote` style listing
    pub fn listing(&self) -> String {
        let mut out = format!("{}\tHEAD\n", self.head);
        for (name, commit) in &self.branches {
            out.push_str(&format!("{}\trefs/heads/{}\n", commit, name));
        }
        for (name, commit) in &self.tags {
            out.push_str(&format!("{}\trefs/tags/{}\n", commit, name));
        }
        out
    }

    fn commits(&self) -> BTreeSet<String> {
        std::iter::once(self.head.clone())
            .chain(self.tags.iter().map(|(_, c)| c.clone()))
            .chain(self.branches.iter().map(|(_, c)| c.clone()))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct FakeCheckout {
    head: Option<String>,
    listing: String,
    commits: BTreeSet<String>,
    dirty: bool,
}

#[derive(Default)]
pub struct FakeGit {
    remotes: Mutex<HashMap<String, FakeRemote>>,
    failures: Mutex<HashMap<String, String>>,
    checkouts: Mutex<HashMap<PathBuf, FakeCheckout>>,
    ops: Mutex<Vec<GitOp>>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote(self, url: &str, remote: FakeRemote) -> Self {
        self.remotes.lock().unwrap().insert(url.to_string(), remote);
        self
    }

    /// Every network operation against `url` fails with `stderr`.
    pub fn failing(self, url: &str, stderr: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), stderr.to_string());
        self
    }

    /// A checkout of the remote at `url`, already on disk at `path`.
    pub fn with_checkout(self, path: &Path, url: &str, head: &str, dirty: bool) -> Self {
        let remote = self.remotes.lock().unwrap().get(url).cloned().unwrap_or_default();
        self.checkouts.lock().unwrap().insert(
            path.to_path_buf(),
            FakeCheckout {
                head: Some(head.to_string()),
                listing: remote.listing(),
                commits: remote.commits(),
                dirty,
            },
        );
        self
    }

    pub fn ops(&self) -> Vec<GitOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<GitOp> {
        self.ops().into_iter().filter(GitOp::mutates).collect()
    }

    pub fn head_of(&self, path: &Path) -> Option<String> {
        self.checkouts
            .lock()
            .unwrap()
            .get(path)
            .and_then(|c| c.head.clone())
    }

    fn record(&self, op: GitOp) {
        self.ops.lock().unwrap().push(op);
    }

    fn remote(&self, command: &str, url: &str) -> Result<FakeRemote, GitError> {
        if let Some(stderr) = self.failures.lock().unwrap().get(url) {
            return Err(GitError::CommandFailed {
                command: format!("git {} {}", command, url),
                stderr: stderr.clone(),
            });
        }
        self.remotes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| GitError::CommandFailed {
                command: format!("git {} {}", command, url),
                stderr: format!("fatal: repository '{}' does not exist", url),
            })
    }

    fn not_a_repo(repo: &Path) -> GitError {
        GitError::CommandFailed {
            command: "git".to_string(),
            stderr: format!("fatal: not a git repository: {}", repo.display()),
        }
    }
}

#[async_trait]
impl GitRunner for FakeGit {
    async fn clone_repo(&self, url: &str, dest: &Path, _no_checkout: bool) -> Result<(), GitError> {
        self.record(GitOp::Clone {
            url: url.to_string(),
            dest: dest.to_path_buf(),
        });
        let remote = self.remote("clone", url)?;
        self.checkouts.lock().unwrap().insert(
            dest.to_path_buf(),
            FakeCheckout {
                head: Some(remote.head.clone()),
                listing: remote.listing(),
                commits: remote.commits(),
                dirty: false,
            },
        );
        Ok(())
    }

    async fn fetch(&self, repo: &Path, url: &str, _refspecs: &[String]) -> Result<(), GitError> {
        self.record(GitOp::Fetch {
            repo: repo.to_path_buf(),
            url: url.to_string(),
        });
        let remote = self.remote("fetch", url)?;
        let mut checkouts = self.checkouts.lock().unwrap();
        let checkout = checkouts.get_mut(repo).ok_or_else(|| Self::not_a_repo(repo))?;
        checkout.listing = remote.listing();
        checkout.commits.extend(remote.commits());
        Ok(())
    }

    async fn checkout(&self, repo: &Path, commit: &str, force: bool) -> Result<(), GitError> {
        self.record(GitOp::Checkout {
            repo: repo.to_path_buf(),
            commit: commit.to_string(),
            force,
        });
        let mut checkouts = self.checkouts.lock().unwrap();
        let checkout = checkouts.get_mut(repo).ok_or_else(|| Self::not_a_repo(repo))?;
        if !checkout.commits.contains(commit) {
            return Err(GitError::CommandFailed {
                command: format!("git checkout {}", commit),
                stderr: format!("error: pathspec '{}' did not match any file(s) known to git", commit),
            });
        }
        if checkout.dirty && !force {
            return Err(GitError::CommandFailed {
                command: format!("git checkout {}", commit),
                stderr: "error: Your local changes to the following files would be overwritten by checkout".to_string(),
            });
        }
        checkout.head = Some(commit.to_string());
        checkout.dirty = false;
        Ok(())
    }

    async fn ls_remote(&self, url: &str) -> Result<String, GitError> {
        self.record(GitOp::LsRemote { url: url.to_string() });
        Ok(self.remote("ls-remote", url)?.listing())
    }

    async fn show_ref(&self, repo: &Path) -> Result<String, GitError> {
        self.record(GitOp::ShowRef {
            repo: repo.to_path_buf(),
        });
        self.checkouts
            .lock()
            .unwrap()
            .get(repo)
            .map(|c| c.listing.clone())
            .ok_or_else(|| Self::not_a_repo(repo))
    }

    async fn rev_parse(&self, repo: &Path, rev: &str) -> Result<Option<String>, GitError> {
        self.record(GitOp::RevParse {
            repo: repo.to_path_buf(),
            rev: rev.to_string(),
        });
        let checkouts = self.checkouts.lock().unwrap();
        let checkout = checkouts.get(repo).ok_or_else(|| Self::not_a_repo(repo))?;
        let rev = rev.to_ascii_lowercase();
        Ok(checkout.commits.iter().find(|c| c.starts_with(&rev)).cloned())
    }

    async fn config_set(&self, repo: &Path, key: &str, _value: &str) -> Result<(), GitError> {
        self.record(GitOp::ConfigSet {
            repo: repo.to_path_buf(),
            key: key.to_string(),
        });
        Ok(())
    }

    async fn git_dir(&self, repo: &Path) -> Result<PathBuf, GitError> {
        self.record(GitOp::GitDir {
            repo: repo.to_path_buf(),
        });
        Ok(repo.join(".git"))
    }

    async fn superproject(&self, root: &Path) -> Result<Option<PathBuf>, GitError> {
        self.record(GitOp::Superproject {
            root: root.to_path_buf(),
        });
        Ok(None)
    }
}

impl RepositoryProbe for FakeGit {
    fn probe(&self, path: &Path) -> Result<SubmoduleState, ProbeError> {
        Ok(match self.checkouts.lock().unwrap().get(path) {
            Some(checkout) => {
                SubmoduleState::checked_out(checkout.head.clone(), checkout.dirty, DEFAULT_SHORT_ID_LEN)
            }
            None => SubmoduleState::absent(),
        })
    }
}

/// Context over `fake` for a manifest rooted at `root`.
pub fn fake_context(root: &Path, manifest: &str, fake: &Arc<FakeGit>, options: SyncOptions) -> SyncContext {
    SyncContext {
        root: root.to_path_buf(),
        manifest: Manifest::parse(manifest).expect("test manifest should parse"),
        options: SyncOptions {
            retry: RetryOptions::none(),
            ..options
        },
        context: CheckoutContext::TopLevel,
        depth: 0,
        git: fake.clone(),
        probe: fake.clone(),
    }
}

/// A 40-character commit id made of one repeated hex digit
pub fn sha(digit: char) -> String {
    std::iter::repeat(digit).take(40).collect()
}
