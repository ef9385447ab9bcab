//! fleximod: keep a superproject's git submodules at the revisions its
//! `.gitmodules` pins them to.
//!
//! Besides git's own keys, each `[submodule]` section carries `fxtag` (the
//! required tag, branch or commit), `fxurl` (where to resolve it) and
//! `fxrequired` (whether the submodule is needed at top level and when
//! nested). `checkout` realizes missing submodules, `update` also moves
//! existing ones, `status` reports without changing anything.

pub mod cli;
pub mod core;
pub mod git;
pub mod telemetry;
pub mod util;

pub use crate::core::manifest::{Manifest, ManifestError, SubmoduleRequirement};
pub use crate::git::{GitRunner, RepositoryProbe, ShellGit};
