//! Superproject fixtures for integration tests.
//!
//! Every submodule gets a bare remote under `remotes/` with two commits on
//! `main`: the first is tagged `v1.0` and also carries the `develop` branch,
//! the second is the remote's HEAD. A fresh clone therefore lands on a commit
//! that is NOT the pinned one, which is what most scenarios need.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use fleximod::cli::{SyncContext, SyncOptions};
use fleximod::git::{GitProbe, ShellGit};
use fleximod::util::RetryOptions;

use super::git_helpers;

/// Commits of one remote
#[derive(Debug, Clone)]
pub struct RemoteInfo {
    pub url: String,
    /// Commit tagged `v1.0` (also the tip of `develop`)
    pub tag_sha: String,
    /// Tip of `main`
    pub head_sha: String,
}

/// How a submodule is present in the superproject before the test runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Absent,
    /// Cloned and left on the remote's HEAD
    AtHead,
    /// Cloned and detached at `v1.0`
    AtTag,
}

#[derive(Debug, Clone)]
struct SubmoduleSpec {
    name: String,
    path: String,
    fxtag: String,
    fxrequired: Option<String>,
    fxurl: Option<String>,
    fxsparse: Option<String>,
    presence: Presence,
    /// (name, path) of submodules listed in this submodule's own manifest
    nested: Vec<(String, String)>,
}

/// A temporary superproject backed by local bare remotes.
pub struct SuperprojectFixture {
    pub _temp: TempDir,
    pub root: PathBuf,
    pub remotes_dir: PathBuf,
    pub remotes: HashMap<String, RemoteInfo>,
}

impl SuperprojectFixture {
    pub fn remote(&self, name: &str) -> &RemoteInfo {
        self.remotes
            .get(name)
            .unwrap_or_else(|| panic!("no remote named {}", name))
    }

    pub fn remote_url(&self, name: &str) -> String {
        self.remote(name).url.clone()
    }

    pub fn tag_sha(&self, name: &str) -> String {
        self.remote(name).tag_sha.clone()
    }

    pub fn head_sha(&self, name: &str) -> String {
        self.remote(name).head_sha.clone()
    }

    /// Absolute path of a submodule checkout
    pub fn submodule_path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(".gitmodules")
    }

    pub fn read_manifest(&self) -> String {
        fs::read_to_string(self.manifest_path()).unwrap()
    }

    pub fn write_manifest(&self, content: &str) {
        fs::write(self.manifest_path(), content).unwrap();
    }

    /// Options suited to offline tests: no backoff between attempts.
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            retry: RetryOptions::none(),
            ..SyncOptions::default()
        }
    }

    /// Open a context over the real git backends.
    pub async fn context(&self, options: SyncOptions) -> SyncContext {
        self.context_with_timeout(options, Duration::from_secs(60)).await
    }

    /// Same as [`Self::context`] with a custom network timeout.
    pub async fn context_with_timeout(&self, options: SyncOptions, timeout: Duration) -> SyncContext {
        let git = Arc::new(ShellGit::new(timeout, options.retry.clone()));
        let probe = Arc::new(GitProbe::default());
        SyncContext::open(&self.root, ".gitmodules", options, git, probe)
            .await
            .expect("fixture manifest should load")
    }
}

/// A `git://` remote that accepts connections and never answers.
///
/// The kernel completes the handshake from the listen backlog, so git sends
/// its request and then waits until it is killed.
pub struct SilentRemote {
    _listener: TcpListener,
    pub url: String,
}

impl SilentRemote {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        Self {
            _listener: listener,
            url: format!("git://127.0.0.1:{port}/silent.git"),
        }
    }
}

/// Builder for a superproject with submodules.
pub struct SuperprojectBuilder {
    submodules: Vec<SubmoduleSpec>,
}

impl SuperprojectBuilder {
    pub fn new() -> Self {
        Self {
            submodules: Vec::new(),
        }
    }

    /// Add a submodule pinned to `v1.0`, required everywhere, not yet cloned.
    pub fn add_submodule(mut self, name: &str, path: &str) -> Self {
        self.submodules.push(SubmoduleSpec {
            name: name.to_string(),
            path: path.to_string(),
            fxtag: "v1.0".to_string(),
            fxrequired: None,
            fxurl: None,
            fxsparse: None,
            presence: Presence::Absent,
            nested: Vec::new(),
        });
        self
    }

    pub fn fxtag(mut self, name: &str, fxtag: &str) -> Self {
        self.spec_mut(name).fxtag = fxtag.to_string();
        self
    }

    pub fn fxrequired(mut self, name: &str, value: &str) -> Self {
        self.spec_mut(name).fxrequired = Some(value.to_string());
        self
    }

    /// Point `url`/`fxurl` somewhere that does not exist.
    pub fn broken_url(mut self, name: &str, url: &str) -> Self {
        self.spec_mut(name).fxurl = Some(url.to_string());
        self
    }

    pub fn fxsparse(mut self, name: &str, file: &str) -> Self {
        self.spec_mut(name).fxsparse = Some(file.to_string());
        self
    }

    pub fn present(mut self, name: &str, presence: Presence) -> Self {
        self.spec_mut(name).presence = presence;
        self
    }

    /// Give `name` its own manifest listing `child` at `child_path`.
    ///
    /// The child must not be added to the superproject itself.
    pub fn nested(mut self, name: &str, child: &str, child_path: &str) -> Self {
        self.spec_mut(name)
            .nested
            .push((child.to_string(), child_path.to_string()));
        self
    }

    fn spec_mut(&mut self, name: &str) -> &mut SubmoduleSpec {
        self.submodules
            .iter_mut()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("add_submodule({}) first", name))
    }

    pub fn build(self) -> SuperprojectFixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("super");
        let remotes_dir = temp.path().join("remotes");
        let staging_dir = temp.path().join("staging");
        fs::create_dir_all(&remotes_dir).unwrap();

        let mut remotes = HashMap::new();

        // Nested children first so their URLs can go into parent manifests.
        for spec in &self.submodules {
            for (child, _) in &spec.nested {
                let info = create_remote(&remotes_dir, &staging_dir, child, None);
                remotes.insert(child.clone(), info);
            }
        }

        for spec in &self.submodules {
            let nested_manifest = if spec.nested.is_empty() {
                None
            } else {
                let sections: Vec<String> = spec
                    .nested
                    .iter()
                    .map(|(child, child_path)| {
                        manifest_section(child, child_path, &remotes[child].url, "v1.0", Some("T:T"), None)
                    })
                    .collect();
                Some(sections.join(""))
            };
            let info = create_remote(&remotes_dir, &staging_dir, &spec.name, nested_manifest.as_deref());
            remotes.insert(spec.name.clone(), info);
        }

        git_helpers::init_repo(&root);
        let manifest: String = self
            .submodules
            .iter()
            .map(|spec| {
                let url = spec
                    .fxurl
                    .clone()
                    .unwrap_or_else(|| remotes[&spec.name].url.clone());
                manifest_section(
                    &spec.name,
                    &spec.path,
                    &url,
                    &spec.fxtag,
                    spec.fxrequired.as_deref(),
                    spec.fxsparse.as_deref(),
                )
            })
            .collect();
        git_helpers::commit_file(&root, ".gitmodules", &manifest, "Add submodule manifest");

        for spec in &self.submodules {
            let dest = root.join(&spec.path);
            match spec.presence {
                Presence::Absent => {}
                Presence::AtHead => git_helpers::clone_repo(&remotes[&spec.name].url, &dest),
                Presence::AtTag => {
                    git_helpers::clone_repo(&remotes[&spec.name].url, &dest);
                    git_helpers::checkout_detached(&dest, "v1.0");
                }
            }
        }

        SuperprojectFixture {
            _temp: temp,
            root,
            remotes_dir,
            remotes,
        }
    }
}

impl Default for SuperprojectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One `[submodule]` section. `fxurl` mirrors `url`.
pub fn manifest_section(
    name: &str,
    path: &str,
    url: &str,
    fxtag: &str,
    fxrequired: Option<&str>,
    fxsparse: Option<&str>,
) -> String {
    let mut section = format!(
        "[submodule \"{name}\"]\n\tpath = {path}\n\turl = {url}\n\tfxtag = {fxtag}\n\tfxurl = {url}\n"
    );
    if let Some(value) = fxrequired {
        section.push_str(&format!("\tfxrequired = {value}\n"));
    }
    if let Some(file) = fxsparse {
        section.push_str(&format!("\tfxsparse = {file}\n"));
    }
    section
}

/// Create `remotes/<name>.git` with the standard two-commit history.
fn create_remote(
    remotes_dir: &Path,
    staging_dir: &Path,
    name: &str,
    nested_manifest: Option<&str>,
) -> RemoteInfo {
    let bare = remotes_dir.join(format!("{}.git", name));
    git_helpers::init_bare_repo(&bare);
    let url = format!("file://{}", bare.display());

    let staging = staging_dir.join(name);
    git_helpers::init_repo(&staging);
    git_helpers::add_remote(&staging, "origin", &url);

    if let Some(manifest) = nested_manifest {
        git_helpers::commit_file(&staging, ".gitmodules", manifest, "Add nested manifest");
    }
    fs::create_dir_all(staging.join("src")).unwrap();
    git_helpers::commit_file(&staging, "src/lib.txt", "library sources\n", "Add sources");
    let tag_sha = git_helpers::commit_file(
        &staging,
        "README.md",
        &format!("# {} v1.0\n", name),
        "Release v1.0",
    );
    git_helpers::tag(&staging, "v1.0");
    git_helpers::branch_here(&staging, "develop");

    let head_sha = git_helpers::commit_file(
        &staging,
        "README.md",
        &format!("# {} unreleased\n", name),
        "Start next release",
    );
    git_helpers::push_all(&staging, "origin");

    RemoteInfo {
        url,
        tag_sha,
        head_sha,
    }
}
