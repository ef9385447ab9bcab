//! Human-readable report lines
//!
//! Status lines are plain text so that scripts can match them. Progress
//! lines for checkout and update go through `cli::output` for decoration.

use serde::Serialize;
use std::fmt;

use crate::core::manifest::SubmoduleRequirement;
use crate::core::plan::Inspection;

/// Synchronization state of one submodule as shown by `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum SyncState {
    InSync,
    OutOfSync,
    NotCheckedOut,
    Error { kind: String, message: String },
}

/// One submodule's status, for both text and JSON output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub name: String,
    pub path: String,
    pub fxtag: String,
    pub required: bool,
    #[serde(flatten)]
    pub state: SyncState,
    pub current_commit: Option<String>,
    pub dirty: bool,
}

impl StatusEntry {
    pub fn from_inspection(
        requirement: &SubmoduleRequirement,
        required: bool,
        inspection: Inspection,
    ) -> Self {
        let mut entry = StatusEntry {
            name: requirement.name.clone(),
            path: requirement.path.clone(),
            fxtag: requirement.fxtag.clone(),
            required,
            state: SyncState::NotCheckedOut,
            current_commit: None,
            dirty: false,
        };

        let state = match inspection.state {
            Ok(state) => state,
            Err(e) => {
                entry.state = SyncState::Error {
                    kind: "probe".to_string(),
                    message: e.to_string(),
                };
                return entry;
            }
        };

        entry.current_commit = state.current_commit;
        entry.dirty = state.dirty;
        entry.state = match inspection.target {
            None => SyncState::NotCheckedOut,
            Some(Err(e)) => SyncState::Error {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
            Some(Ok(target)) => match state.head.as_deref() {
                Some(head) if target.matches(head) => SyncState::InSync,
                _ => SyncState::OutOfSync,
            },
        };
        entry
    }

    /// Lines printed by `status`, in order
    pub fn lines(&self) -> Vec<String> {
        let name = &self.name;
        let fxtag = &self.fxtag;
        let mut lines = vec![match &self.state {
            SyncState::InSync => format!("{name} at tag {fxtag}"),
            SyncState::OutOfSync => format!(
                "{name} {} is out of sync with .gitmodules {fxtag}",
                self.current_commit.as_deref().unwrap_or("(no commit)")
            ),
            SyncState::NotCheckedOut if self.required => {
                format!("{name} not checked out, expected {fxtag}")
            }
            SyncState::NotCheckedOut => format!("{name} not checked out (optional)"),
            SyncState::Error { kind, message } => format!("{name} error: {kind}: {message}"),
        }];
        if self.dirty {
            lines.push(format!("{name} has local modifications"));
        }
        lines
    }

    /// Whether `test` should count this entry as a failure
    pub fn is_problem(&self) -> bool {
        self.dirty
            || match self.state {
                SyncState::InSync => false,
                SyncState::NotCheckedOut => self.required,
                SyncState::OutOfSync | SyncState::Error { .. } => true,
            }
    }
}

/// Extra consistency findings reported by `test`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestFinding {
    UrlMismatch { name: String, url: String, fxurl: String },
    MissingSparseFile { name: String, fxsparse: String },
}

impl fmt::Display for TestFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestFinding::UrlMismatch { name, url, fxurl } => {
                write!(f, "{name} url {url} not in sync with required {fxurl}")
            }
            TestFinding::MissingSparseFile { name, fxsparse } => {
                write!(f, "{name} sparse checkout file {fxsparse} not found")
            }
        }
    }
}

/// Result of reconciling one submodule during checkout or update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmoduleReport {
    Created { name: String, fxtag: String },
    Updated { name: String, fxtag: String, from: Option<String> },
    UpToDate { name: String, fxtag: String },
    Skipped { name: String },
    Deferred { name: String, fxtag: String, current: Option<String> },
    Failed { name: String, kind: &'static str, message: String },
}

impl fmt::Display for SubmoduleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmoduleReport::Created { name, fxtag } => write!(f, "{name} checked out at {fxtag}"),
            SubmoduleReport::Updated { name, fxtag, from: Some(from) } => {
                write!(f, "{name} updated from {from} to {fxtag}")
            }
            SubmoduleReport::Updated { name, fxtag, from: None } => {
                write!(f, "{name} updated to {fxtag}")
            }
            SubmoduleReport::UpToDate { name, fxtag } => write!(f, "{name} at tag {fxtag}"),
            SubmoduleReport::Skipped { name } => write!(f, "{name} skipped (not required)"),
            SubmoduleReport::Deferred { name, fxtag, current } => write!(
                f,
                "{name} {} is out of sync with .gitmodules {fxtag}, run update to move it",
                current.as_deref().unwrap_or("(no commit)")
            ),
            SubmoduleReport::Failed { name, kind, message } => {
                write!(f, "{name} failed ({kind}): {message}")
            }
        }
    }
}

/// Counts across one checkout or update run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub deferred: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, report: &SubmoduleReport) {
        self.total += 1;
        match report {
            SubmoduleReport::Created { .. } | SubmoduleReport::Updated { .. } => self.changed += 1,
            SubmoduleReport::UpToDate { .. } => self.unchanged += 1,
            SubmoduleReport::Skipped { .. } => self.skipped += 1,
            SubmoduleReport::Deferred { .. } => self.deferred += 1,
            SubmoduleReport::Failed { .. } => self.failed += 1,
        }
    }

    /// Fold in the counts of a nested run
    pub fn absorb(&mut self, other: RunSummary) {
        self.total += other.total;
        self.changed += other.changed;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.deferred += other.deferred;
        self.failed += other.failed;
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Final line printed when anything failed
    pub fn failure_line(&self) -> Option<String> {
        (self.failed > 0).then(|| format!("{} of {} submodules failed", self.failed, self.total))
    }
}
