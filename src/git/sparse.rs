//! Sparse checkout setup for submodules that declare `fxsparse`

use std::path::{Path, PathBuf};
use tracing::debug;

use super::apply::CheckoutError;
use super::GitRunner;

/// Pattern file for a requirement, relative to the submodule directory.
pub fn pattern_file(submodule_dir: &Path, fxsparse: &str) -> PathBuf {
    submodule_dir.join(fxsparse)
}

/// Enable sparse checkout and write the patterns into the submodule's git dir.
///
/// Takes effect at the next checkout; git only consults the patterns when it
/// updates the work tree.
pub async fn configure(
    git: &dyn GitRunner,
    submodule_dir: &Path,
    fxsparse: &str,
    patterns: &str,
) -> Result<(), CheckoutError> {
    git.config_set(submodule_dir, "core.sparseCheckout", "true")
        .await?;

    let git_dir = git.git_dir(submodule_dir).await?;
    let info = git_dir.join("info");
    tokio::fs::create_dir_all(&info).await?;
    tokio::fs::write(info.join("sparse-checkout"), patterns).await?;

    debug!(path = %submodule_dir.display(), fxsparse, "Sparse checkout enabled");
    Ok(())
}

/// Read sparse patterns for `fxsparse`.
///
/// Before a clone the work tree is empty, so the file normally lives outside
/// the submodule itself (usually `../something` in the parent).
pub async fn read_patterns(submodule_dir: &Path, fxsparse: &str) -> Result<String, CheckoutError> {
    let path = pattern_file(submodule_dir, fxsparse);
    match tokio::fs::read_to_string(&path).await {
        Ok(patterns) => Ok(patterns),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(CheckoutError::SparseFile(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}
