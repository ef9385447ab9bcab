//! Checkout command implementation

use crate::cli::commands::reconcile::{finish, preview, reconcile, Mode};
use crate::cli::context::SyncContext;
use crate::cli::output::Output;
use crate::core::report::RunSummary;

/// Run the checkout command.
///
/// Clones required submodules that are missing. Existing checkouts at the
/// wrong commit are reported and left for `update`.
pub async fn run_checkout(ctx: &SyncContext, dry_run: bool) -> anyhow::Result<RunSummary> {
    if dry_run {
        return preview(ctx, Mode::Checkout).await;
    }

    Output::header(&format!(
        "Checking out submodules in {}...",
        ctx.root().display()
    ));

    let spinner = Output::spinner("Checking out submodules...");
    let result = reconcile(ctx, Mode::Checkout, &spinner).await;
    spinner.finish_and_clear();

    let summary = result?;
    finish(&summary);
    Ok(summary)
}
