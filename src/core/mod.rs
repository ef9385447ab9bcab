//! Core logic for fleximod: manifest, planning, revision resolution, reports

pub mod manifest;
pub mod manifest_paths;
pub mod plan;
pub mod report;
pub mod revision;

pub use manifest::{CheckoutContext, FxRequired, Manifest, ManifestError, SubmoduleRequirement};
pub use plan::{PlanOptions, PlannedSync, SyncAction, SyncEngine, SyncError};
pub use report::{RunSummary, StatusEntry, SubmoduleReport};
pub use revision::{ResolvedRevision, RevisionKind, DEFAULT_RESOLUTION_ORDER};
