//! Sync context passed to command handlers
//!
//! Bundles the superproject root, its parsed manifest, the global CLI flags
//! and the git backends into a single struct.

use anyhow::Context as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::manifest::{CheckoutContext, Manifest, ManifestError, SubmoduleRequirement};
use crate::core::manifest_paths::locate_manifest;
use crate::core::plan::PlanOptions;
use crate::core::revision::{RevisionKind, DEFAULT_RESOLUTION_ORDER};
use crate::git::{ApplyOptions, GitRunner, RepositoryProbe};
use crate::util::RetryOptions;

/// Flags shared by every command
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Components named on the command line; empty means all
    pub components: Vec<String>,
    /// Components to leave alone (`--exclude`)
    pub exclude: Vec<String>,
    /// Discard local modifications (`--force`)
    pub force: bool,
    /// Act on optional submodules too (`--optional`)
    pub optional: bool,
    /// Submodules processed concurrently (`--jobs`)
    pub jobs: usize,
    /// Backoff for network operations (`--retries`)
    pub retry: RetryOptions,
    /// Revision kind precedence
    pub order: Vec<RevisionKind>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            components: Vec::new(),
            exclude: Vec::new(),
            force: false,
            optional: false,
            jobs: 1,
            retry: RetryOptions::default(),
            order: DEFAULT_RESOLUTION_ORDER.to_vec(),
        }
    }
}

/// Everything a command handler needs.
///
/// Created once in `main()` after locating the manifest, then passed by
/// reference to every command. Nested superprojects get a child context.
pub struct SyncContext {
    /// Directory submodule paths are relative to
    pub root: PathBuf,
    /// Parsed manifest
    pub manifest: Manifest,
    pub options: SyncOptions,
    /// Whether `root` is a top-level checkout or nested in another
    pub context: CheckoutContext,
    /// Recursion depth, 0 for the superproject the user pointed at
    pub depth: usize,
    pub git: Arc<dyn GitRunner>,
    pub probe: Arc<dyn RepositoryProbe>,
}

impl SyncContext {
    /// Locate and parse the manifest starting at `start`, then detect the context.
    pub async fn open(
        start: &Path,
        manifest_name: &str,
        options: SyncOptions,
        git: Arc<dyn GitRunner>,
        probe: Arc<dyn RepositoryProbe>,
    ) -> anyhow::Result<Self> {
        let location = locate_manifest(start, manifest_name).with_context(|| {
            format!(
                "No {} found in {} or any parent directory",
                manifest_name,
                start.display()
            )
        })?;
        debug!(manifest = %location.manifest.display(), "Loading manifest");

        let manifest = Manifest::load(&location.manifest)
            .with_context(|| format!("Invalid manifest {}", location.manifest.display()))?;
        let context = detect_context(git.as_ref(), &location.root).await;

        Ok(Self {
            root: location.root,
            manifest,
            options,
            context,
            depth: 0,
            git,
            probe,
        })
    }

    /// Get the root as a `&Path`
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Requirements selected by the component and exclude lists, in manifest order
    pub fn selected(&self) -> Result<Vec<&SubmoduleRequirement>, ManifestError> {
        self.manifest
            .select(&self.options.components, &self.options.exclude)
    }

    /// Naming a component explicitly counts as asking for it, optional or not.
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            context: self.context,
            include_optional: self.options.optional || !self.options.components.is_empty(),
            order: self.options.order.clone(),
        }
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            force: self.options.force,
            retry: self.options.retry.clone(),
            order: self.options.order.clone(),
        }
    }

    /// Context for a submodule that has its own manifest.
    ///
    /// Component selection does not carry over; `--force` and `--optional` do.
    pub fn nested(&self, root: PathBuf, manifest: Manifest) -> SyncContext {
        SyncContext {
            root,
            manifest,
            options: SyncOptions {
                components: Vec::new(),
                exclude: Vec::new(),
                ..self.options.clone()
            },
            context: CheckoutContext::Nested,
            depth: self.depth + 1,
            git: Arc::clone(&self.git),
            probe: Arc::clone(&self.probe),
        }
    }
}

/// Top-level unless git reports a superproject around `root`.
pub async fn detect_context(git: &dyn GitRunner, root: &Path) -> CheckoutContext {
    match git.superproject(root).await {
        Ok(Some(superproject)) => {
            debug!(superproject = %superproject.display(), "Running nested");
            CheckoutContext::Nested
        }
        Ok(None) => CheckoutContext::TopLevel,
        Err(e) => {
            warn!(error = %e, "Could not detect superproject, assuming top-level");
            CheckoutContext::TopLevel
        }
    }
}
