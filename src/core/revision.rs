//! Revision resolution
//!
//! Turns an `fxtag` into a commit id. A name can match a commit, a tag or a
//! branch; the kinds are tried in a fixed precedence and the first match
//! wins. When two kinds match and disagree on the commit the name is
//! ambiguous and resolution fails rather than guessing.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::manifest::SubmoduleRequirement;
use crate::git::{GitError, GitRunner};

/// Kinds of revision an `fxtag` may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionKind {
    Commit,
    Tag,
    Branch,
}

impl fmt::Display for RevisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionKind::Commit => write!(f, "commit"),
            RevisionKind::Tag => write!(f, "tag"),
            RevisionKind::Branch => write!(f, "branch"),
        }
    }
}

/// Precedence used when nothing else is configured: commit, then tag, then branch.
pub const DEFAULT_RESOLUTION_ORDER: [RevisionKind; 3] =
    [RevisionKind::Commit, RevisionKind::Tag, RevisionKind::Branch];

/// Shortest hex string accepted as an abbreviated commit id
const MIN_COMMIT_PREFIX: usize = 7;

/// Errors raised while resolving an `fxtag`
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("'{rev}' is ambiguous: {first} and {second} point at different commits")]
    Ambiguous {
        rev: String,
        first: RevisionKind,
        second: RevisionKind,
    },

    #[error("'{rev}' not found in {url}")]
    NotFound { rev: String, url: String },

    #[error(transparent)]
    Git(#[from] GitError),
}

/// An `fxtag` pinned to a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRevision {
    /// Which kind of name matched
    pub kind: RevisionKind,
    /// Full commit id, or the abbreviated id as written when unverified
    pub commit: String,
    /// False when the id has not been seen in any ref listing or object store
    pub verified: bool,
}

impl ResolvedRevision {
    /// Whether `head` (a full commit id) is this revision
    pub fn matches(&self, head: &str) -> bool {
        head.to_ascii_lowercase()
            .starts_with(&self.commit.to_ascii_lowercase())
    }
}

/// Tags and branches as listed by `git ls-remote` or `git show-ref -d`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefSnapshot {
    tags: BTreeMap<String, String>,
    branches: BTreeMap<String, String>,
}

impl RefSnapshot {
    /// Parse `<sha> <refname>` lines.
    ///
    /// Annotated tags appear twice; the peeled `^{}` entry names the commit
    /// and takes precedence over the tag object itself.
    pub fn parse(listing: &str) -> Self {
        let mut snapshot = RefSnapshot::default();
        let mut peeled = BTreeMap::new();

        for line in listing.lines() {
            let mut fields = line.split_whitespace();
            let (Some(sha), Some(name)) = (fields.next(), fields.next()) else {
                continue;
            };

            if let Some(tag) = name.strip_prefix("refs/tags/") {
                match tag.strip_suffix("^{}") {
                    Some(tag) => {
                        peeled.insert(tag.to_string(), sha.to_string());
                    }
                    None => {
                        snapshot.tags.insert(tag.to_string(), sha.to_string());
                    }
                }
            } else if let Some(branch) = name.strip_prefix("refs/heads/") {
                snapshot.branches.insert(branch.to_string(), sha.to_string());
            }
        }

        snapshot.tags.extend(peeled);
        snapshot
    }

    /// Commit a tag points at
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Commit at the tip of a branch
    pub fn branch(&self, name: &str) -> Option<&str> {
        self.branches.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.branches.is_empty()
    }
}

/// Whether `rev` could be a (possibly abbreviated) commit id
pub fn looks_like_commit(rev: &str) -> bool {
    (MIN_COMMIT_PREFIX..=40).contains(&rev.len()) && rev.chars().all(|c| c.is_ascii_hexdigit())
}

/// Match `rev` against a known commit and a ref listing.
///
/// `commit` is the full id `rev` expands to in the object store, if any.
/// Returns `Ok(None)` when no kind matches.
pub fn resolve_revision(
    rev: &str,
    commit: Option<&str>,
    refs: &RefSnapshot,
    order: &[RevisionKind],
) -> Result<Option<ResolvedRevision>, ResolveError> {
    let matches: Vec<(RevisionKind, &str)> = order
        .iter()
        .filter_map(|kind| {
            let hit = match kind {
                RevisionKind::Commit => commit,
                RevisionKind::Tag => refs.tag(rev),
                RevisionKind::Branch => refs.branch(rev),
            };
            hit.map(|sha| (*kind, sha))
        })
        .collect();

    let Some(&(kind, sha)) = matches.first() else {
        return Ok(None);
    };

    if let Some(&(other, _)) = matches.iter().find(|(_, other_sha)| *other_sha != sha) {
        return Err(ResolveError::Ambiguous {
            rev: rev.to_string(),
            first: kind,
            second: other,
        });
    }

    Ok(Some(ResolvedRevision {
        kind,
        commit: sha.to_string(),
        verified: true,
    }))
}

/// Resolve a requirement's `fxtag`.
///
/// Local refs of `repo_dir` are consulted first; `fxurl` is only listed when
/// nothing matches locally. A hex-looking `fxtag` that matches nothing is
/// returned unverified so that a later fetch can still find it.
pub async fn resolve_fxtag(
    git: &dyn GitRunner,
    requirement: &SubmoduleRequirement,
    repo_dir: Option<&Path>,
    order: &[RevisionKind],
) -> Result<ResolvedRevision, ResolveError> {
    let rev = requirement.fxtag.as_str();

    if let Some(dir) = repo_dir {
        let commit = if looks_like_commit(rev) {
            git.rev_parse(dir, rev)
                .await?
                .filter(|full| full.to_ascii_lowercase().starts_with(&rev.to_ascii_lowercase()))
        } else {
            None
        };
        let local = RefSnapshot::parse(&git.show_ref(dir).await?);
        if let Some(resolved) = resolve_revision(rev, commit.as_deref(), &local, order)? {
            debug!(submodule = %requirement.name, rev, commit = %resolved.commit, kind = %resolved.kind, "Resolved locally");
            return Ok(resolved);
        }
    }

    let remote = RefSnapshot::parse(&git.ls_remote(&requirement.fxurl).await?);
    if let Some(resolved) = resolve_revision(rev, None, &remote, order)? {
        debug!(submodule = %requirement.name, rev, commit = %resolved.commit, kind = %resolved.kind, "Resolved from remote");
        return Ok(resolved);
    }

    if looks_like_commit(rev) && order.contains(&RevisionKind::Commit) {
        return Ok(ResolvedRevision {
            kind: RevisionKind::Commit,
            commit: rev.to_ascii_lowercase(),
            verified: false,
        });
    }

    Err(ResolveError::NotFound {
        rev: rev.to_string(),
        url: requirement.fxurl.clone(),
    })
}
