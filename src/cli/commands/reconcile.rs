//! Shared plan-and-apply loop behind `checkout` and `update`

use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use tracing::{debug, warn};

use crate::cli::context::SyncContext;
use crate::cli::output::Output;
use crate::core::manifest::{Manifest, ManifestError, SubmoduleRequirement};
use crate::core::manifest_paths::{manifest_in_dir, DEFAULT_MANIFEST_NAME};
use crate::core::plan::{SyncAction, SyncEngine};
use crate::core::report::{RunSummary, SubmoduleReport};
use crate::git::{Applier, ApplyOutcome};

/// How far nested superprojects are followed
pub const MAX_RECURSION_DEPTH: usize = 8;

/// Which actions a run may carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Clone missing submodules; leave existing checkouts where they are
    Checkout,
    /// Clone missing submodules and move existing ones to their `fxtag`
    Update,
}

/// Plan and apply every selected submodule, then recurse into nested manifests.
///
/// Results are printed in manifest order as they complete. Per-submodule
/// failures are counted, not returned; only manifest problems are errors.
/// The returned future is not `Send`; await it on the calling task.
pub fn reconcile<'a>(
    ctx: &'a SyncContext,
    mode: Mode,
    spinner: &'a ProgressBar,
) -> LocalBoxFuture<'a, anyhow::Result<RunSummary>> {
    async move {
        let selected = ctx.selected()?;
        let plan_options = ctx.plan_options();
        let apply_options = ctx.apply_options();
        let engine = SyncEngine::new(ctx.root(), ctx.git.as_ref(), ctx.probe.as_ref(), &plan_options);
        let applier = Applier::new(ctx.root(), ctx.git.as_ref(), &apply_options);

        debug!(
            root = %ctx.root().display(),
            context = %ctx.context,
            count = selected.len(),
            jobs = ctx.options.jobs,
            "Reconciling"
        );

        let mut summary = RunSummary::default();
        let mut results = stream::iter(selected)
            .map(|requirement| reconcile_one(&engine, &applier, requirement, mode))
            .buffered(ctx.options.jobs.max(1));

        while let Some((requirement, report)) = results.next().await {
            spinner.suspend(|| Output::report(&report));
            summary.record(&report);

            let settled = matches!(
                report,
                SubmoduleReport::Created { .. }
                    | SubmoduleReport::Updated { .. }
                    | SubmoduleReport::UpToDate { .. }
            );
            if settled {
                let nested = reconcile_nested(ctx, requirement, mode, spinner).await?;
                summary.absorb(nested);
            }
        }

        Ok(summary)
    }
    .boxed_local()
}

async fn reconcile_one<'r>(
    engine: &SyncEngine<'_>,
    applier: &Applier<'_>,
    requirement: &'r SubmoduleRequirement,
    mode: Mode,
) -> (&'r SubmoduleRequirement, SubmoduleReport) {
    let name = requirement.name.clone();
    let fxtag = requirement.fxtag.clone();
    let planned = engine.plan_one(requirement).await;

    let report = match planned.action {
        Err(e) => SubmoduleReport::Failed {
            name,
            kind: e.kind(),
            message: e.to_string(),
        },
        Ok(SyncAction::Skip) => SubmoduleReport::Skipped { name },
        Ok(SyncAction::NoOp { .. }) => SubmoduleReport::UpToDate { name, fxtag },
        Ok(SyncAction::CheckoutTag { from, .. }) if mode == Mode::Checkout => {
            SubmoduleReport::Deferred {
                name,
                fxtag,
                current: from,
            }
        }
        Ok(action) => match applier.apply(requirement, &action).await {
            Ok(ApplyOutcome::Created { .. }) => SubmoduleReport::Created { name, fxtag },
            Ok(ApplyOutcome::Updated { from, .. }) => SubmoduleReport::Updated { name, fxtag, from },
            Ok(ApplyOutcome::Unchanged) => SubmoduleReport::UpToDate { name, fxtag },
            Ok(ApplyOutcome::Skipped) => SubmoduleReport::Skipped { name },
            Err(e) => SubmoduleReport::Failed {
                name,
                kind: e.kind(),
                message: e.to_string(),
            },
        },
    };

    (requirement, report)
}

/// Reconcile the submodule's own manifest, if it has one, in nested context.
async fn reconcile_nested(
    ctx: &SyncContext,
    requirement: &SubmoduleRequirement,
    mode: Mode,
    spinner: &ProgressBar,
) -> anyhow::Result<RunSummary> {
    let dir = requirement.absolute_path(ctx.root());
    let Some(manifest_path) = manifest_in_dir(&dir, DEFAULT_MANIFEST_NAME) else {
        return Ok(RunSummary::default());
    };

    if ctx.depth + 1 > MAX_RECURSION_DEPTH {
        warn!(submodule = %requirement.name, depth = ctx.depth, "Nesting too deep, not recursing");
        return Ok(RunSummary::default());
    }

    let mut summary = RunSummary::default();
    let manifest = match Manifest::load(&manifest_path) {
        Ok(manifest) => manifest,
        Err(ManifestError::Empty) => return Ok(summary),
        Err(e) => {
            // The parent checkout already happened; a broken nested manifest
            // only fails this branch of the tree.
            let report = SubmoduleReport::Failed {
                name: requirement.name.clone(),
                kind: "manifest",
                message: format!("{}: {}", manifest_path.display(), e),
            };
            spinner.suspend(|| Output::report(&report));
            summary.record(&report);
            return Ok(summary);
        }
    };

    spinner.suspend(|| {
        Output::info(&format!(
            "Submodules of {}",
            Output::submodule_name(&requirement.name)
        ))
    });
    let child = ctx.nested(dir, manifest);
    reconcile(&child, mode, spinner).await
}

/// Print what would happen without changing anything.
pub async fn preview(ctx: &SyncContext, mode: Mode) -> anyhow::Result<RunSummary> {
    let selected = ctx.selected()?;
    let plan_options = ctx.plan_options();
    let engine = SyncEngine::new(ctx.root(), ctx.git.as_ref(), ctx.probe.as_ref(), &plan_options);

    let mut summary = RunSummary::default();
    for planned in engine.plan(&selected).await {
        let name = &planned.requirement.name;
        summary.total += 1;
        match &planned.action {
            Ok(SyncAction::CheckoutTag { from, .. }) if mode == Mode::Checkout => {
                summary.deferred += 1;
                println!(
                    "{name}: deferred to update (at {})",
                    from.as_deref().unwrap_or("no commit")
                );
            }
            Ok(action) => println!("{name}: {action}"),
            Err(e) => {
                summary.failed += 1;
                println!("{name}: error ({}): {e}", e.kind());
            }
        }
    }
    Ok(summary)
}

/// Closing line for a checkout or update run
pub fn finish(summary: &RunSummary) {
    match summary.failure_line() {
        Some(line) => Output::error(&line),
        None if summary.changed > 0 => Output::success(&format!(
            "{} submodule(s) changed, {} already in place",
            summary.changed, summary.unchanged
        )),
        None => {}
    }
}
