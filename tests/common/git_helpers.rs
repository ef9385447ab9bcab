//! Plain `git` plumbing for building test repositories.
//!
//! Everything runs offline against `file://` remotes. Helpers panic on any
//! git failure so a broken fixture shows up at the line that built it.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const USER: [(&str, &str); 2] = [("user.email", "fleximod@example.com"), ("user.name", "Fleximod Test")];

fn run(dir: Option<&Path>, args: &[&str]) -> Output {
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd.args(args)
        .output()
        .unwrap_or_else(|e| panic!("cannot spawn git {}: {}", args.join(" "), e))
}

fn expect_ok(dir: Option<&Path>, args: &[&str]) -> String {
    let out = run(dir, args);
    if !out.status.success() {
        panic!(
            "git {} failed{}: {}",
            args.join(" "),
            dir.map(|d| format!(" in {}", d.display())).unwrap_or_default(),
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn git(dir: &Path, args: &[&str]) -> String {
    expect_ok(Some(dir), args)
}

fn set_identity(dir: &Path) {
    for (key, value) in USER {
        git(dir, &["config", key, value]);
    }
}

pub fn init_bare_repo(path: &Path) {
    fs::create_dir_all(path).unwrap();
    git(path, &["init", "--quiet", "--bare", "-b", "main"]);
}

pub fn init_repo(path: &Path) {
    fs::create_dir_all(path).unwrap();
    git(path, &["init", "--quiet", "-b", "main"]);
    set_identity(path);
}

/// Write `filename` (creating parent dirs), commit it, return the new HEAD.
pub fn commit_file(repo: &Path, filename: &str, content: &str, message: &str) -> String {
    let file = repo.join(filename);
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(&file, content).unwrap();
    git(repo, &["add", filename]);
    git(repo, &["commit", "--quiet", "-m", message]);
    get_head_sha(repo)
}

/// Annotated tag at HEAD
pub fn tag(repo: &Path, name: &str) {
    git(repo, &["tag", "-a", name, "-m", &format!("Release {name}")]);
}

pub fn branch_here(repo: &Path, name: &str) {
    git(repo, &["branch", name]);
}

pub fn add_remote(repo: &Path, name: &str, url: &str) {
    git(repo, &["remote", "add", name, url]);
}

pub fn push_all(repo: &Path, remote: &str) {
    git(repo, &["push", "--quiet", "--all", remote]);
    git(repo, &["push", "--quiet", "--tags", remote]);
}

pub fn clone_repo(url: &str, dest: &Path) {
    let dest_str = dest.to_str().unwrap();
    expect_ok(None, &["clone", "--quiet", url, dest_str]);
    set_identity(dest);
}

pub fn checkout_detached(repo: &Path, rev: &str) {
    git(repo, &["checkout", "--quiet", "--detach", rev]);
}

pub fn get_head_sha(repo: &Path) -> String {
    git(repo, &["rev-parse", "HEAD"])
}

/// Index or tracked files differ from HEAD; untracked files don't count.
pub fn has_tracked_changes(repo: &Path) -> bool {
    !git(repo, &["status", "--porcelain", "--untracked-files=no"]).is_empty()
}

pub fn config_value(repo: &Path, key: &str) -> Option<String> {
    let out = run(Some(repo), &["config", "--get", key]);
    out.status
        .success()
        .then(|| String::from_utf8_lossy(&out.stdout).trim().to_string())
}
