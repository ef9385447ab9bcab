//! Command logging for `--verbose` output.

use std::process::Command;
use tracing::debug;

/// Log a command just before execution.
///
/// Visible with `-vv` (which sets `fleximod=debug`) or via
/// `RUST_LOG=fleximod::cmd=debug`.
pub fn log_cmd(cmd: &Command) {
    let program = cmd.get_program().to_string_lossy();
    let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy()).collect();
    let cwd = cmd
        .get_current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    debug!(
        target: "fleximod::cmd",
        %program,
        ?args,
        %cwd,
        "exec"
    );
}

/// Render a command as a single shell-like line for error messages.
pub fn describe_cmd(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
