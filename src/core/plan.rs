//! Sync planning
//!
//! Compares each requirement against what is on disk and decides what, if
//! anything, has to happen. Planning inspects and resolves but never
//! mutates; [`crate::git::Applier`] carries the actions out.

use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::manifest::{CheckoutContext, SubmoduleRequirement};
use crate::core::revision::{resolve_fxtag, ResolvedRevision, RevisionKind, DEFAULT_RESOLUTION_ORDER};
use crate::git::{CheckoutError, GitRunner, ProbeError, RepositoryProbe, SubmoduleState};

/// Per-submodule failure during planning or applying
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

impl SyncError {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Probe(_) => "probe",
            SyncError::Checkout(e) => e.kind(),
        }
    }
}

/// What has to happen to one submodule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Nothing on disk yet
    Clone,
    /// Checked out at the wrong commit
    CheckoutTag {
        target: ResolvedRevision,
        /// Abbreviated commit currently checked out
        from: Option<String>,
        dirty: bool,
    },
    /// Already at `at`
    NoOp { at: ResolvedRevision },
    /// Not required in this context
    Skip,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Clone => write!(f, "clone"),
            SyncAction::CheckoutTag { target, .. } => {
                write!(f, "checkout {} {}", target.kind, target.commit)
            }
            SyncAction::NoOp { .. } => write!(f, "none"),
            SyncAction::Skip => write!(f, "skip"),
        }
    }
}

/// One entry of a plan, in manifest order
#[derive(Debug)]
pub struct PlannedSync<'r> {
    pub requirement: &'r SubmoduleRequirement,
    /// `None` when the path was never inspected (skipped or unreadable)
    pub state: Option<SubmoduleState>,
    pub action: Result<SyncAction, SyncError>,
}

/// What status reporting needs to know about one submodule
#[derive(Debug)]
pub struct Inspection {
    pub state: Result<SubmoduleState, ProbeError>,
    /// Resolved `fxtag`; only attempted when a checkout exists
    pub target: Option<Result<ResolvedRevision, CheckoutError>>,
}

/// Planning knobs
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub context: CheckoutContext,
    /// Treat optional submodules as required
    pub include_optional: bool,
    pub order: Vec<RevisionKind>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            context: CheckoutContext::TopLevel,
            include_optional: false,
            order: DEFAULT_RESOLUTION_ORDER.to_vec(),
        }
    }
}

/// Decides the action for each requirement
pub struct SyncEngine<'a> {
    root: &'a Path,
    git: &'a dyn GitRunner,
    probe: &'a dyn RepositoryProbe,
    options: &'a PlanOptions,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        root: &'a Path,
        git: &'a dyn GitRunner,
        probe: &'a dyn RepositoryProbe,
        options: &'a PlanOptions,
    ) -> Self {
        Self {
            root,
            git,
            probe,
            options,
        }
    }

    /// Whether a requirement is acted on in the current context
    pub fn is_required(&self, requirement: &SubmoduleRequirement) -> bool {
        self.options.include_optional || requirement.fxrequired.required_in(self.options.context)
    }

    /// Plan every requirement, preserving order.
    ///
    /// A failure for one submodule is recorded in its entry and does not
    /// stop the rest from being planned.
    pub async fn plan<'r>(&self, requirements: &[&'r SubmoduleRequirement]) -> Vec<PlannedSync<'r>> {
        let mut plan = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            plan.push(self.plan_one(requirement).await);
        }
        plan
    }

    /// Plan a single requirement.
    pub async fn plan_one<'r>(&self, requirement: &'r SubmoduleRequirement) -> PlannedSync<'r> {
        if !self.is_required(requirement) {
            debug!(submodule = %requirement.name, context = %self.options.context, "Not required, skipping");
            return PlannedSync {
                requirement,
                state: None,
                action: Ok(SyncAction::Skip),
            };
        }

        let state = match self.probe.probe(&requirement.absolute_path(self.root)) {
            Ok(state) => state,
            Err(e) => {
                return PlannedSync {
                    requirement,
                    state: None,
                    action: Err(e.into()),
                }
            }
        };

        let action = self.decide(requirement, &state).await;
        debug!(submodule = %requirement.name, action = ?action, "Planned");

        PlannedSync {
            requirement,
            state: Some(state),
            action,
        }
    }

    async fn decide(
        &self,
        requirement: &SubmoduleRequirement,
        state: &SubmoduleState,
    ) -> Result<SyncAction, SyncError> {
        if !state.exists {
            return Ok(SyncAction::Clone);
        }

        let target = self.resolve(requirement).await?;
        match state.head.as_deref() {
            Some(head) if target.matches(head) => Ok(SyncAction::NoOp { at: target }),
            _ => Ok(SyncAction::CheckoutTag {
                target,
                from: state.current_commit.clone(),
                dirty: state.dirty,
            }),
        }
    }

    /// Inspect without regard to whether the submodule is required.
    pub async fn inspect(&self, requirement: &SubmoduleRequirement) -> Inspection {
        let state = self.probe.probe(&requirement.absolute_path(self.root));
        let target = match &state {
            Ok(state) if state.exists => Some(self.resolve(requirement).await),
            _ => None,
        };
        Inspection { state, target }
    }

    async fn resolve(&self, requirement: &SubmoduleRequirement) -> Result<ResolvedRevision, CheckoutError> {
        let dir = requirement.absolute_path(self.root);
        Ok(resolve_fxtag(self.git, requirement, Some(&dir), &self.options.order).await?)
    }
}
