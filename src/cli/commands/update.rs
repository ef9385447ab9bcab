//! Update command implementation

use crate::cli::commands::reconcile::{finish, preview, reconcile, Mode};
use crate::cli::context::SyncContext;
use crate::cli::output::Output;
use crate::core::report::RunSummary;

/// Run the update command: clone what is missing and move every required
/// submodule to its `fxtag`.
pub async fn run_update(ctx: &SyncContext, dry_run: bool) -> anyhow::Result<RunSummary> {
    if dry_run {
        return preview(ctx, Mode::Update).await;
    }

    Output::header(&format!("Updating submodules in {}...", ctx.root().display()));
    if ctx.options.force {
        Output::warning("--force: local modifications in submodules will be discarded");
    }

    let spinner = Output::spinner("Updating submodules...");
    let result = reconcile(ctx, Mode::Update, &spinner).await;
    spinner.finish_and_clear();

    let summary = result?;
    finish(&summary);
    Ok(summary)
}
