//! Manifest location helpers.

use std::path::{Path, PathBuf};

pub const DEFAULT_MANIFEST_NAME: &str = ".gitmodules";

/// A manifest and the directory submodule paths are relative to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLocation {
    pub root: PathBuf,
    pub manifest: PathBuf,
}

/// Manifest file `file_name` directly inside `dir`, if present.
pub fn manifest_in_dir(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let path = dir.join(file_name);
    path.is_file().then_some(path)
}

/// Walk from `start` towards the filesystem root looking for `file_name`.
///
/// The first directory containing it becomes the root.
pub fn locate_manifest(start: &Path, file_name: &str) -> Option<ManifestLocation> {
    start.ancestors().find_map(|dir| {
        manifest_in_dir(dir, file_name).map(|manifest| ManifestLocation {
            root: dir.to_path_buf(),
            manifest,
        })
    })
}
