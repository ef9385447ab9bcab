//! Status command implementation
//!
//! Read-only. Lines are printed undecorated, one or two per submodule, so
//! that repeated runs over an unchanged tree print identical output.

use futures::stream::{self, StreamExt};

use crate::cli::context::SyncContext;
use crate::core::plan::SyncEngine;
use crate::core::report::StatusEntry;

/// Inspect every selected submodule, in manifest order.
pub async fn collect_status(ctx: &SyncContext) -> anyhow::Result<Vec<StatusEntry>> {
    let selected = ctx.selected()?;
    let options = ctx.plan_options();
    let engine = SyncEngine::new(ctx.root(), ctx.git.as_ref(), ctx.probe.as_ref(), &options);

    let entries = stream::iter(selected)
        .map(|requirement| {
            let engine = &engine;
            async move {
                let required = engine.is_required(requirement);
                let inspection = engine.inspect(requirement).await;
                StatusEntry::from_inspection(requirement, required, inspection)
            }
        })
        .buffered(ctx.options.jobs.max(1))
        .collect::<Vec<_>>()
        .await;

    Ok(entries)
}

/// Run the status command
pub async fn run_status(ctx: &SyncContext, json: bool) -> anyhow::Result<Vec<StatusEntry>> {
    let entries = collect_status(ctx).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for line in entries.iter().flat_map(StatusEntry::lines) {
            println!("{line}");
        }
    }

    Ok(entries)
}
