// SPDX-FileCopyrightText: 2026 Downstream contributors <downstream@crates.dev>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the settings file and the sync manifest that
//! downstream uses to simplify the process of serialization and
//! deserialization. File I/O is kept to thin `load` helpers; everything else
//! works on plain strings and byte slices so callers and tests can feed data
//! from anywhere.
//!
//! # Settings
//!
//! Tool settings live in a TOML file, `downstream.toml` by default. Every
//! section and field carries a default, so a missing or empty file still
//! yields a usable configuration for everything except operations that
//! genuinely need to know the child repository.
//!
//! # Sync Manifest
//!
//! The manifest is a JSON array of `{"source", "target"}` path pairs and is
//! tracked inside the repositories themselves. It is deliberately parsed from
//! raw bytes: the same bytes that were read out of a blob get staged back
//! into the child untouched, so parsing must never become a rewrite.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

/// Settings layout.
///
/// Top-level layout of `downstream.toml`. Each section groups the knobs of
/// one concern: the child repository to mirror into, the bot identity used
/// for commits, the synchronization behaviour itself, the pull request
/// dressing, GitHub access, and the wholesale mirror fallback.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Child repository that receives synced files.
    pub child: ChildSettings,

    /// Identity used for commits made on the child.
    pub bot: BotIdentity,

    /// Synchronization behaviour.
    pub sync: SyncSettings,

    /// Pull request dressing for the child repository.
    pub pull_request: PullRequestSettings,

    /// GitHub access settings.
    pub github: GithubSettings,

    /// Wholesale mirror settings.
    pub mirror: MirrorSettings,
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadFile`] if the file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the TOML is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|err| ConfigError::ReadFile {
            source: err,
            path: path.as_ref().to_path_buf(),
        })?;

        data.parse()
    }

    /// Remote URL of a repository under the configured remote root.
    pub fn remote_url(&self, repo: &RepoSlug) -> String {
        format!("{}/{repo}.git", self.github.remote_root)
    }

    /// Remote URL of the child repository, when one is configured.
    ///
    /// An explicit `child.url` wins over the URL derived from `child.repo`.
    pub fn child_remote_url(&self) -> Option<String> {
        self.child
            .url
            .clone()
            .or_else(|| self.child.repo.as_ref().map(|repo| self.remote_url(repo)))
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on the scratch workspace field.
        if let Some(workspace) = &settings.sync.workspace {
            let expanded = shellexpand::full(workspace.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned();
            settings.sync.workspace = Some(PathBuf::from(expanded));
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Child repository settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChildSettings {
    /// Child repository in `owner/name` form.
    pub repo: Option<RepoSlug>,

    /// Remote URL override for clones and pushes.
    pub url: Option<String>,

    /// Base branch that sync branches fork from and merge back into.
    pub base: String,
}

impl Default for ChildSettings {
    fn default() -> Self {
        Self {
            repo: None,
            url: None,
            base: default_base(),
        }
    }
}

/// Commit identity used on the child repository.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BotIdentity {
    pub name: String,
    pub email: String,
}

impl Default for BotIdentity {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            email: default_bot_email(),
        }
    }
}

/// Synchronization behaviour settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Repository-relative path of the sync manifest.
    pub manifest: String,

    /// Prefix of the deterministic sync branch name.
    pub branch_prefix: String,

    /// Scratch directory holding the working clones.
    pub workspace: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            branch_prefix: default_branch_prefix(),
            workspace: None,
        }
    }
}

/// Pull request dressing for the child repository.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PullRequestSettings {
    /// User to assign on created pull requests.
    pub assignee: Option<String>,

    /// User to request a review from on created pull requests.
    pub reviewer: Option<String>,

    /// Label attached to every automated pull request.
    pub label: LabelSettings,
}

/// Label attached to automated pull requests, created on demand.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelSettings {
    pub name: String,
    pub color: String,
    pub description: String,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            name: default_label_name(),
            color: default_label_color(),
            description: default_label_description(),
        }
    }
}

/// GitHub access settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GithubSettings {
    /// Root that `owner/name` slugs are resolved against. Pointing this at a
    /// local directory keeps every clone, fetch, and push on the file system.
    pub remote_root: String,

    /// Name or path of the `gh` binary.
    pub program: PathBuf,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            remote_root: default_remote_root(),
            program: default_gh_program(),
        }
    }
}

/// Wholesale mirror settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MirrorSettings {
    /// Remote URL of the repository mirrored from.
    pub source_url: Option<String>,

    /// Remote URL of the repository mirrored into.
    pub target_url: Option<String>,
}

/// A GitHub repository in `owner/name` form.
///
/// Keeps the two halves separate so callers can derive URLs, API arguments,
/// and branch names without re-splitting strings everywhere.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoSlug {
    owner: String,
    name: String,
}

impl RepoSlug {
    /// Owning user or organization.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Bare repository name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slug usable inside a branch name.
    ///
    /// Flattens the `/` between owner and name so the sync branch stays a
    /// single hierarchy level. Deterministic, so one source pull request
    /// always maps to the same branch.
    pub fn branch_slug(&self) -> String {
        format!("{}-{}", self.owner, self.name)
    }
}

impl FromStr for RepoSlug {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let malformed = || ConfigError::MalformedRepoSlug(data.to_string());
        let (owner, name) = data.split_once('/').ok_or_else(malformed)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(malformed());
        }
        if data.chars().any(char::is_whitespace) {
            return Err(malformed());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl Display for RepoSlug {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}/{}", self.owner, self.name)
    }
}

impl TryFrom<String> for RepoSlug {
    type Error = ConfigError;

    fn try_from(data: String) -> Result<Self, Self::Error> {
        data.parse()
    }
}

impl From<RepoSlug> for String {
    fn from(slug: RepoSlug) -> Self {
        slug.to_string()
    }
}

/// One `source -> target` pair of the sync manifest.
///
/// Both fields are repository-relative file paths: `source` inside the
/// parent, `target` inside the child.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SyncEntry {
    pub source: String,
    pub target: String,
}

/// The sync manifest: which parent files land where in the child.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct SyncManifest {
    entries: Vec<SyncEntry>,
}

impl SyncManifest {
    /// Parse a manifest from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Manifest`] if the bytes are not a JSON array
    ///   of `{"source", "target"}` objects.
    /// - Return [`ConfigError::EmptyManifestPath`] if an entry carries an
    ///   empty path on either side.
    /// - Return [`ConfigError::EscapingManifestPath`] if an entry carries a
    ///   path that walks out of the repository root.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let entries: Vec<SyncEntry> =
            serde_json::from_slice(bytes).map_err(ConfigError::Manifest)?;

        for (index, entry) in entries.iter().enumerate() {
            check_manifest_path(index, "source", &entry.source)?;
            check_manifest_path(index, "target", &entry.target)?;
        }

        Ok(Self { entries })
    }

    /// Load a manifest from a local JSON file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadFile`] if the file cannot be read.
    /// - Return [`ConfigError::Manifest`] if its contents do not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref()).map_err(|err| ConfigError::ReadFile {
            source: err,
            path: path.as_ref().to_path_buf(),
        })?;

        Self::from_slice(&bytes)
    }

    /// View the mapping entries in manifest order.
    pub fn entries(&self) -> &[SyncEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl FromStr for SyncManifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::from_slice(data.as_bytes())
    }
}

impl<'a> IntoIterator for &'a SyncManifest {
    type Item = &'a SyncEntry;
    type IntoIter = std::slice::Iter<'a, SyncEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn check_manifest_path(index: usize, field: &'static str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ConfigError::EmptyManifestPath { index, field });
    }
    if escapes_repository_root(path) {
        return Err(ConfigError::EscapingManifestPath {
            index,
            field,
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Check whether a repository-relative path walks out of the repository.
///
/// Manifest paths end up joined onto work tree roots, so anything absolute
/// or climbing above the root must never make it past parsing.
fn escapes_repository_root(path: &str) -> bool {
    let mut depth = 0usize;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            Component::Prefix(_) | Component::RootDir => return true,
        }
    }
    false
}

fn default_base() -> String {
    "main".to_string()
}

fn default_bot_name() -> String {
    "github-actions[bot]".to_string()
}

fn default_bot_email() -> String {
    "41898282+github-actions[bot]@users.noreply.github.com".to_string()
}

fn default_manifest() -> String {
    "autosync/files.json".to_string()
}

fn default_branch_prefix() -> String {
    "auto-update-from-".to_string()
}

fn default_label_name() -> String {
    "automated pr".to_string()
}

fn default_label_color() -> String {
    "0E8A16".to_string()
}

fn default_label_description() -> String {
    "Automated pull request".to_string()
}

fn default_remote_root() -> String {
    "https://github.com".to_string()
}

fn default_gh_program() -> PathBuf {
    PathBuf::from("gh")
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize settings.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize settings.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on settings.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to parse the sync manifest.
    #[error(transparent)]
    Manifest(#[from] serde_json::Error),

    /// Failed to read a configuration file.
    #[error("failed to read {:?}", path.display())]
    ReadFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// A manifest entry carries an empty path.
    #[error("manifest entry {index} has an empty {field} path")]
    EmptyManifestPath { index: usize, field: &'static str },

    /// A manifest entry carries a path leaving the repository root.
    #[error("manifest entry {index} {field} path {path:?} escapes the repository root")]
    EscapingManifestPath {
        index: usize,
        field: &'static str,
        path: String,
    },

    /// A repository slug is not in `owner/name` form.
    #[error("repository must be '<owner>/<name>', got {0:?}")]
    MalformedRepoSlug(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
