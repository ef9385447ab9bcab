//! Manifest parsing and validation
//!
//! The manifest (`.gitmodules`) declares the submodules of a superproject.
//! Besides git's own `path` and `url` keys, each section carries the `fx*`
//! keys that pin a submodule to a revision and say when it is required.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when loading or validating a manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Submodule '{name}' is missing required key '{key}'")]
    MissingKey { name: String, key: &'static str },

    #[error("Submodule '{0}' is declared more than once")]
    DuplicateName(String),

    #[error("Submodules '{first}' and '{second}' both use path '{path}'")]
    DuplicatePath {
        first: String,
        second: String,
        path: String,
    },

    #[error("Submodule '{name}' has invalid fxrequired '{value}' (expected T:T, T:F, F:T or F:F)")]
    InvalidFxRequired { name: String, value: String },

    #[error("Path escapes superproject boundary: {0}")]
    PathTraversal(String),

    #[error("No submodule components found in manifest")]
    Empty,

    #[error("Unknown component '{0}' (not declared in the manifest)")]
    UnknownComponent(String),
}

/// Where the manifest's repository sits relative to other checkouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckoutContext {
    /// The superproject was checked out on its own
    TopLevel,
    /// The superproject is itself a submodule of another checkout
    Nested,
}

impl fmt::Display for CheckoutContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckoutContext::TopLevel => write!(f, "top-level"),
            CheckoutContext::Nested => write!(f, "nested"),
        }
    }
}

/// The `fxrequired` pair: is the submodule mandatory in each context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FxRequired {
    pub top_level: bool,
    pub nested: bool,
}

impl FxRequired {
    /// Required everywhere; used when a section has no `fxrequired` key
    pub const ALWAYS: FxRequired = FxRequired {
        top_level: true,
        nested: true,
    };

    /// Parse `T:F`-style pairs and the long names older manifests use
    pub fn parse(value: &str) -> Option<Self> {
        let pair = |top_level, nested| Some(FxRequired { top_level, nested });
        match value.trim() {
            "T:T" | "AlwaysRequired" => pair(true, true),
            "T:F" | "ToplevelRequired" | "ToplevelOnlyRequired" => pair(true, false),
            "F:T" => pair(false, true),
            "F:F" | "AlwaysOptional" | "ToplevelOptional" => pair(false, false),
            _ => None,
        }
    }

    /// Whether the submodule must be present in the given context
    pub fn required_in(&self, context: CheckoutContext) -> bool {
        match context {
            CheckoutContext::TopLevel => self.top_level,
            CheckoutContext::Nested => self.nested,
        }
    }
}

impl fmt::Display for FxRequired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |b: bool| if b { 'T' } else { 'F' };
        write!(f, "{}:{}", flag(self.top_level), flag(self.nested))
    }
}

/// One `[submodule "<name>"]` entry of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmoduleRequirement {
    /// Section name, unique across the manifest
    pub name: String,
    /// Location relative to the superproject root, normalized
    pub path: String,
    /// Primary remote to clone from
    pub url: String,
    /// Required revision: tag, branch or commit
    pub fxtag: String,
    /// Remote used when resolving `fxtag` (defaults to `url`)
    pub fxurl: String,
    /// Requirement flags per checkout context
    pub fxrequired: FxRequired,
    /// Sparse-checkout pattern file, relative to the submodule directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fxsparse: Option<String>,
}

impl SubmoduleRequirement {
    /// URL handed to `git clone`.
    ///
    /// GitHub SSH URLs are rewritten to HTTPS so that users without SSH keys
    /// can still check out public submodules.
    pub fn clone_url(&self) -> String {
        match self.url.strip_prefix("git@github.com:") {
            Some(rest) => format!("https://github.com/{}", rest),
            None => self.url.clone(),
        }
    }

    /// Absolute location of the submodule below `root`
    pub fn absolute_path(&self, root: &Path) -> PathBuf {
        root.join(&self.path)
    }
}

/// The parsed manifest, in declaration order
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub submodules: Vec<SubmoduleRequirement>,
}

static SECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\[\s*([A-Za-z][A-Za-z0-9.-]*)(?:\s+"([^"]*)")?\s*\]$"#)
        .expect("hardcoded regex must be valid")
});

static KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9-]*)\s*=\s*(.*)$").expect("hardcoded regex must be valid")
});

/// A section as written, before validation
struct RawSection {
    name: String,
    entries: Vec<(String, String)>,
}

impl RawSection {
    /// Last non-empty value for `key`; repeated keys override earlier ones
    fn value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<&str, ManifestError> {
        self.value(key).ok_or_else(|| ManifestError::MissingKey {
            name: self.name.clone(),
            key,
        })
    }
}

enum Cursor {
    Outside,
    Ignored,
    Submodule(usize),
}

impl Manifest {
    /// Load a manifest from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        debug!(path = %path.as_ref().display(), "Loading manifest");
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a manifest from its text
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let sections = Self::scan(content)?;
        if sections.is_empty() {
            return Err(ManifestError::Empty);
        }

        let mut names = HashSet::new();
        let mut paths: HashMap<String, String> = HashMap::new();
        let mut submodules = Vec::with_capacity(sections.len());

        for raw in sections {
            if !names.insert(raw.name.clone()) {
                return Err(ManifestError::DuplicateName(raw.name));
            }
            let requirement = Self::validate_section(&raw)?;
            if let Some(first) = paths.get(&requirement.path) {
                return Err(ManifestError::DuplicatePath {
                    first: first.clone(),
                    second: requirement.name,
                    path: requirement.path,
                });
            }
            paths.insert(requirement.path.clone(), requirement.name.clone());
            submodules.push(requirement);
        }

        Ok(Manifest { submodules })
    }

    /// Split the text into raw submodule sections
    fn scan(content: &str) -> Result<Vec<RawSection>, ManifestError> {
        let mut sections: Vec<RawSection> = Vec::new();
        let mut cursor = Cursor::Outside;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(caps) = SECTION_RE.captures(line) {
                let kind = &caps[1];
                match (kind, caps.get(2)) {
                    ("submodule", Some(name)) => {
                        sections.push(RawSection {
                            name: name.as_str().to_string(),
                            entries: Vec::new(),
                        });
                        cursor = Cursor::Submodule(sections.len() - 1);
                    }
                    ("submodule", None) => {
                        return Err(ManifestError::Syntax {
                            line: line_no,
                            message: "submodule section without a name".to_string(),
                        });
                    }
                    _ => {
                        warn!(line = line_no, section = %line, "Ignoring non-submodule section");
                        cursor = Cursor::Ignored;
                    }
                }
                continue;
            }

            let Some(caps) = KEY_RE.captures(line) else {
                return Err(ManifestError::Syntax {
                    line: line_no,
                    message: format!("expected 'key = value', found '{}'", line),
                });
            };

            match cursor {
                Cursor::Submodule(i) => {
                    let value = unquote(caps[2].trim());
                    sections[i]
                        .entries
                        .push((caps[1].to_string(), value.to_string()));
                }
                Cursor::Ignored => {}
                Cursor::Outside => {
                    return Err(ManifestError::Syntax {
                        line: line_no,
                        message: format!("key '{}' outside of any section", &caps[1]),
                    });
                }
            }
        }

        Ok(sections)
    }

    fn validate_section(raw: &RawSection) -> Result<SubmoduleRequirement, ManifestError> {
        let path = normalize_path(raw.required("path")?)?;
        let url = raw.required("url")?.to_string();
        let fxtag = raw.required("fxtag")?.to_string();
        let fxurl = raw.value("fxurl").unwrap_or(&url).to_string();

        let fxrequired = match raw.value("fxrequired") {
            None => FxRequired::ALWAYS,
            Some(value) => {
                FxRequired::parse(value).ok_or_else(|| ManifestError::InvalidFxRequired {
                    name: raw.name.clone(),
                    value: value.to_string(),
                })?
            }
        };

        Ok(SubmoduleRequirement {
            name: raw.name.clone(),
            path,
            url,
            fxtag,
            fxurl,
            fxrequired,
            fxsparse: raw.value("fxsparse").map(str::to_string),
        })
    }

    /// Number of declared submodules
    pub fn len(&self) -> usize {
        self.submodules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submodules.is_empty()
    }

    /// Look up a submodule by name
    pub fn get(&self, name: &str) -> Option<&SubmoduleRequirement> {
        self.submodules.iter().find(|s| s.name == name)
    }

    /// Pick the submodules a command should act on, keeping manifest order.
    ///
    /// An empty `include` selects everything. Every name given in either list
    /// must be declared in the manifest.
    pub fn select(
        &self,
        include: &[String],
        exclude: &[String],
    ) -> Result<Vec<&SubmoduleRequirement>, ManifestError> {
        for name in include.iter().chain(exclude) {
            if self.get(name).is_none() {
                return Err(ManifestError::UnknownComponent(name.clone()));
            }
        }

        Ok(self
            .submodules
            .iter()
            .filter(|s| include.is_empty() || include.contains(&s.name))
            .filter(|s| !exclude.contains(&s.name))
            .collect())
    }
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Normalize a submodule path and reject anything outside the superproject
fn normalize_path(path: &str) -> Result<String, ManifestError> {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return Err(ManifestError::PathTraversal(path.to_string()));
    }

    let mut parts = Vec::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(ManifestError::PathTraversal(path.to_string())),
        }
    }

    if parts.is_empty() {
        return Err(ManifestError::PathTraversal(path.to_string()));
    }
    Ok(parts.join("/"))
}
