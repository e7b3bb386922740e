// SPDX-FileCopyrightText: 2026 Downstream contributors <downstream@crates.dev>
// SPDX-License-Identifier: MIT

//! Parent to child synchronization.
//!
//! [`SyncSession::run`] drives one full pass for a single parent pull
//! request: clone the child, read the pull request from GitHub, fetch the
//! parent, adopt manifest changes, copy diverged files, commit onto a
//! deterministic sync branch, push, and finally open or refresh the child's
//! own pull request. Every run is triggered for exactly one parent pull
//! request and owns exactly one sync branch, so repeated triggers for the
//! same pull request keep extending the same branch instead of littering
//! the child with duplicates.
//!
//! Open pull requests are synchronized from their head branch, merged ones
//! from the branch they merged into.
//!
//! [`run_full_mirror`] is the blunter sibling: clone both repositories,
//! copy every mapped file, and push straight to the child's base branch.
//! It exists for seeding a child or repairing drift, not for review-driven
//! synchronization.

use crate::{
    config::{ConfigError, RepoSlug, Settings, SyncEntry, SyncManifest},
    github::{GitHubError, GitHubOps, PullRequest, PullRequestDraft},
    mirror::{remote::RemoteAuth, Mirror, MirrorError},
    path,
};
use indicatif::{MultiProgress, ProgressBar};
use std::{
    collections::HashSet,
    fs, io,
    path::PathBuf,
};
use tracing::{debug, info, instrument, warn};

/// Remote name the parent repository is registered under in the child clone.
const PARENT_REMOTE: &str = "parent-repo";

/// One synchronization pass from a parent pull request into the child.
pub struct SyncSession<'a, G> {
    settings: &'a Settings,
    auth: RemoteAuth,
    github: &'a G,
}

impl<'a, G: GitHubOps> SyncSession<'a, G> {
    /// Construct a session over shared settings, credentials, and GitHub
    /// access.
    pub fn new(settings: &'a Settings, auth: RemoteAuth, github: &'a G) -> Self {
        Self {
            settings,
            auth,
            github,
        }
    }

    /// Synchronize the child with one pull request of the parent.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::ChildNotConfigured`] if no child repository is
    ///   configured.
    /// - Return [`SyncError::Config`] if the parent's sync manifest cannot
    ///   be parsed.
    /// - Return [`SyncError::Mirror`] if any git operation fails.
    /// - Return [`SyncError::GitHub`] if pull request creation fails.
    #[instrument(skip(self), level = "debug")]
    pub fn run(&self, parent: &RepoSlug, pr_number: u64) -> Result<SyncReport> {
        let child = self
            .settings
            .child
            .repo
            .as_ref()
            .ok_or(SyncError::ChildNotConfigured)?;
        let branch = branch_name(&self.settings.sync.branch_prefix, parent, pr_number);

        let mirror = self.prepare_child(child, &branch)?;

        let Some(pr) = self.github.view_pr(parent, pr_number)? else {
            info!("nothing to sync from {parent} PR {pr_number}");
            return Ok(SyncReport {
                branch,
                manifest_changed: false,
                actions: Vec::new(),
                outcome: SyncOutcome::SourceUnavailable,
            });
        };
        if pr.head_ref_name.is_empty() {
            warn!("{parent} PR {pr_number} reports no head branch, nothing to sync");
            return Ok(SyncReport {
                branch,
                manifest_changed: false,
                actions: Vec::new(),
                outcome: SyncOutcome::SourceUnavailable,
            });
        }

        mirror.ensure_remote(PARENT_REMOTE, &self.settings.remote_url(parent))?;
        mirror.fetch_remote(PARENT_REMOTE, ProgressBar::no_length())?;

        // INVARIANT: Merged pull requests are read from the branch they
        // merged into, open ones from their head branch.
        let source_branch = if pr.is_merged() {
            &pr.base_ref_name
        } else {
            &pr.head_ref_name
        };
        let source_ref = format!("{PARENT_REMOTE}/{source_branch}");
        let base_ref = format!("origin/{}", self.settings.child.base);

        let (manifest, manifest_changed) = self.acquire_manifest(&mirror, &source_ref, &base_ref)?;
        report_coverage(&manifest, &pr);

        let plan = plan(&mirror, &manifest, &source_ref, &base_ref)?;
        let actions = apply(&mirror, &plan, &source_ref)?;

        let files_found = actions.iter().any(SyncAction::changed);
        if !manifest_changed && !files_found {
            info!("child already carries everything {parent} PR {pr_number} touches");
            return Ok(SyncReport {
                branch,
                manifest_changed,
                actions,
                outcome: SyncOutcome::NoChanges,
            });
        }

        let message = commit_message(parent, pr_number, manifest_changed, files_found);
        if mirror.commit(&message)?.is_none() {
            info!("staged state matches the sync branch tip, nothing to push");
            return Ok(SyncReport {
                branch,
                manifest_changed,
                actions,
                outcome: SyncOutcome::NoChanges,
            });
        }
        mirror.push_branch(&branch, ProgressBar::no_length())?;

        let pull_request = self.manage_pull_request(&mirror, child, parent, pr_number, &branch)?;
        Ok(SyncReport {
            branch,
            manifest_changed,
            actions,
            outcome: SyncOutcome::Pushed { pull_request },
        })
    }

    /// Clone the child and check out the sync branch.
    fn prepare_child(&self, child: &RepoSlug, branch: &str) -> Result<Mirror> {
        let url = self
            .settings
            .child_remote_url()
            .unwrap_or_else(|| self.settings.remote_url(child));
        let workspace = scratch_dir(self.settings)?;
        let clone_path = workspace.join(child.branch_slug());

        let mirror = Mirror::clone(&url, &clone_path, self.auth.clone(), ProgressBar::no_length())?;
        mirror.set_bot_identity(&self.settings.bot.name, &self.settings.bot.email)?;
        mirror.checkout_sync_branch(branch)?;
        Ok(mirror)
    }

    /// Determine the manifest to sync with, adopting parent-side changes.
    ///
    /// The manifest itself is a synchronized file: when its blob differs
    /// between the source ref and the child's base, the parent's version is
    /// staged into the child verbatim and the run plans with the new
    /// mapping. A manifest deleted on the parent side is dropped from the
    /// child and the run plans with an empty mapping.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Config`] if the manifest bytes are not valid
    ///   JSON mapping entries.
    /// - Return [`SyncError::Mirror`] if blob lookups or staging fail.
    fn acquire_manifest(
        &self,
        mirror: &Mirror,
        source_ref: &str,
        base_ref: &str,
    ) -> Result<(SyncManifest, bool)> {
        let rel = &self.settings.sync.manifest;
        let source_id = mirror.blob_id(source_ref, rel)?;
        let base_id = mirror.blob_id(base_ref, rel)?;

        if source_id == base_id {
            if mirror.work_file_exists(rel) {
                let manifest = SyncManifest::load(mirror.workdir().join(rel))?;
                return Ok((manifest, false));
            }
            debug!("no sync manifest on either side, planning with an empty mapping");
            return Ok((SyncManifest::default(), false));
        }

        match mirror.read_blob(source_ref, rel)? {
            Some(bytes) => {
                info!("sync manifest changed on the parent, adopting it");
                let manifest = SyncManifest::from_slice(&bytes)?;
                mirror.write_file(rel, &bytes)?;
                mirror.stage(rel)?;
                Ok((manifest, true))
            }
            None => {
                warn!("sync manifest removed on the parent, dropping it from the child");
                if mirror.work_file_exists(rel) {
                    mirror.stage_removal(rel)?;
                }
                Ok((SyncManifest::default(), true))
            }
        }
    }

    /// Open a pull request for the sync branch, or refresh the existing one.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::GitHub`] if creation fails. Label management
    ///   and comments are best effort and only warn.
    fn manage_pull_request(
        &self,
        mirror: &Mirror,
        child: &RepoSlug,
        parent: &RepoSlug,
        pr_number: u64,
        branch: &str,
    ) -> Result<PullRequestOutcome> {
        let open = self.github.open_pr_numbers(child, branch)?;
        if let Some(number) = open.first() {
            info!("pull request {number} already tracks {branch}, leaving a note");
            if let Err(err) = self.github.comment(child, *number, "Automatically updated") {
                warn!("failed to comment on pull request {number}: {err}");
            }
            return Ok(PullRequestOutcome::Commented(*number));
        }

        if mirror.commits_ahead(branch, &self.settings.child.base)? == 0 {
            info!("{branch} holds no commits beyond {}", self.settings.child.base);
            return Ok(PullRequestOutcome::NoCommits);
        }

        self.ensure_label(child);
        let pr_settings = &self.settings.pull_request;
        let draft = PullRequestDraft {
            head: branch.to_string(),
            base: self.settings.child.base.clone(),
            title: format!("[Automated] Sync from {parent} PR {pr_number}"),
            body: format!("Automated synchronization from {parent} PR #{pr_number}"),
            label: pr_settings.label.name.clone(),
            assignee: pr_settings.assignee.clone(),
            reviewer: pr_settings.reviewer.clone(),
        };
        info!("opening pull request for {branch}");
        self.github.create_pr(child, &draft)?;
        Ok(PullRequestOutcome::Created)
    }

    /// Make sure the child carries the label new pull requests get.
    fn ensure_label(&self, child: &RepoSlug) {
        let label = &self.settings.pull_request.label;
        match self.github.labels(child) {
            Ok(names) if names.iter().any(|name| name == &label.name) => {}
            Ok(_) => {
                info!("creating label {:?} on {child}", label.name);
                if let Err(err) = self.github.create_label(child, label) {
                    warn!("failed to create label {:?}: {err}", label.name);
                }
            }
            Err(err) => warn!("failed to list labels on {child}: {err}"),
        }
    }
}

/// Outcome of one synchronization pass.
#[derive(Debug)]
pub struct SyncReport {
    /// Sync branch the pass operated on.
    pub branch: String,

    /// Whether the manifest itself changed on the parent side.
    pub manifest_changed: bool,

    /// What happened to each planned entry.
    pub actions: Vec<SyncAction>,

    pub outcome: SyncOutcome,
}

/// How a synchronization pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The source pull request could not be read; nothing happened.
    SourceUnavailable,

    /// Parent and child were already in sync; nothing was pushed.
    NoChanges,

    /// The sync branch was pushed.
    Pushed { pull_request: PullRequestOutcome },
}

/// What happened to the child's pull request after a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestOutcome {
    /// A new pull request was opened.
    Created,

    /// An existing pull request got a refresh comment.
    Commented(u64),

    /// The sync branch holds nothing beyond the base branch.
    NoCommits,
}

/// What happened to one manifest entry during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// The source blob was copied over the target path.
    Copied { source: String, target: String },

    /// The target was removed because the source no longer exists.
    Removed { target: String },

    /// Source and target are both absent; there is nothing to do.
    Skipped { source: String },
}

impl SyncAction {
    /// Check whether the action staged anything.
    pub fn changed(&self) -> bool {
        !matches!(self, SyncAction::Skipped { .. })
    }
}

/// Deterministic sync branch name for one parent pull request.
fn branch_name(prefix: &str, parent: &RepoSlug, pr_number: u64) -> String {
    format!("{prefix}{}-pr-{pr_number}", parent.branch_slug())
}

/// Scratch directory working clones live under.
fn scratch_dir(settings: &Settings) -> Result<PathBuf> {
    match &settings.sync.workspace {
        Some(workspace) => Ok(workspace.clone()),
        None => Ok(path::default_workspace_dir()?),
    }
}

/// Commit message for one pass.
///
/// A pass that only adopted a manifest change reads differently from one
/// that moved file content, so reviewers can tell mapping updates apart
/// from content updates in the child's history.
fn commit_message(
    parent: &RepoSlug,
    pr_number: u64,
    manifest_changed: bool,
    files_found: bool,
) -> String {
    if manifest_changed && !files_found {
        format!("Update sync mapping from {parent} PR {pr_number}")
    } else {
        format!("Sync changes from {parent} PR {pr_number}")
    }
}

/// Log how much of the pull request the manifest actually covers.
fn report_coverage(manifest: &SyncManifest, pr: &PullRequest) {
    if pr.files.is_empty() {
        return;
    }
    let sources: HashSet<&str> = manifest
        .entries()
        .iter()
        .map(|entry| entry.source.as_str())
        .collect();
    let covered = pr
        .files
        .iter()
        .filter(|file| sources.contains(file.path.as_str()))
        .count();
    info!(
        "pull request touches {} files, {covered} of them mapped for synchronization",
        pr.files.len()
    );
}

/// Entries whose source and target blobs differ.
fn plan(
    mirror: &Mirror,
    manifest: &SyncManifest,
    source_ref: &str,
    base_ref: &str,
) -> Result<Vec<SyncEntry>> {
    let mut entries = Vec::new();
    for entry in manifest {
        let source_id = mirror.blob_id(source_ref, &entry.source)?;
        let target_id = mirror.blob_id(base_ref, &entry.target)?;
        if source_id != target_id {
            debug!("{} diverged from {}", entry.source, entry.target);
            entries.push(entry.clone());
        }
    }
    Ok(entries)
}

/// Stage every planned entry into the work tree.
fn apply(mirror: &Mirror, entries: &[SyncEntry], source_ref: &str) -> Result<Vec<SyncAction>> {
    let mut actions = Vec::with_capacity(entries.len());
    for entry in entries {
        match mirror.read_blob(source_ref, &entry.source)? {
            Some(bytes) => {
                info!("copying {} to {}", entry.source, entry.target);
                mirror.write_file(&entry.target, &bytes)?;
                mirror.stage(&entry.target)?;
                actions.push(SyncAction::Copied {
                    source: entry.source.clone(),
                    target: entry.target.clone(),
                });
            }
            None if mirror.work_file_exists(&entry.target) => {
                info!("removing {}, its source is gone", entry.target);
                mirror.stage_removal(&entry.target)?;
                actions.push(SyncAction::Removed {
                    target: entry.target.clone(),
                });
            }
            None => {
                info!("{} absent on both sides, skipping", entry.source);
                actions.push(SyncAction::Skipped {
                    source: entry.source.clone(),
                });
            }
        }
    }
    Ok(actions)
}

/// Outcome of one full mirror pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    /// Mapped files copied into the target clone.
    pub copied: usize,

    /// Mapped files missing from the source work tree.
    pub missing: usize,

    /// Whether anything was committed and pushed.
    pub pushed: bool,
}

/// Copy every mapped file from `source_url` into `target_url` and push the
/// result straight to the child's base branch.
///
/// Both clones run concurrently; everything after that is sequential. Files
/// missing from the source work tree are skipped with a warning rather than
/// failing the pass, since a mapping is allowed to run ahead of the parent.
///
/// # Errors
///
/// - Return [`SyncError::Mirror`] if cloning, staging, committing, or
///   pushing fails.
/// - Return [`SyncError::ReadFile`] if a source file exists but cannot be
///   read.
pub async fn run_full_mirror(
    settings: &Settings,
    auth: RemoteAuth,
    source_url: &str,
    target_url: &str,
    manifest: &SyncManifest,
) -> Result<MirrorReport> {
    let workspace = scratch_dir(settings)?.join("mirror");
    let progress = MultiProgress::new();

    let source_task = {
        let url = source_url.to_string();
        let clone_path = workspace.join("source");
        let auth = auth.clone();
        let bar = progress.add(ProgressBar::no_length());
        tokio::task::spawn_blocking(move || Mirror::clone(&url, &clone_path, auth, bar))
    };
    let target_task = {
        let url = target_url.to_string();
        let clone_path = workspace.join("target");
        let auth = auth.clone();
        let bar = progress.add(ProgressBar::no_length());
        tokio::task::spawn_blocking(move || Mirror::clone(&url, &clone_path, auth, bar))
    };
    let (source, target) = tokio::try_join!(source_task, target_task)?;
    let (source, target) = (source?, target?);

    target.set_bot_identity(&settings.bot.name, &settings.bot.email)?;

    let mut copied = 0;
    let mut missing = 0;
    for entry in manifest {
        let source_path = source.workdir().join(&entry.source);
        match fs::read(&source_path) {
            Ok(bytes) => {
                debug!("copying {} to {}", entry.source, entry.target);
                target.write_file(&entry.target, &bytes)?;
                copied += 1;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!("{} does not exist in the source repository", entry.source);
                missing += 1;
            }
            Err(err) => {
                return Err(SyncError::ReadFile {
                    source: err,
                    path: source_path,
                })
            }
        }
    }

    target.stage_all()?;
    if !target.has_staged_changes()? {
        info!("target repository already matches the source");
        return Ok(MirrorReport {
            copied,
            missing,
            pushed: false,
        });
    }

    target.commit("Auto-sync files")?;
    target.push_head_to(&settings.child.base, progress.add(ProgressBar::no_length()))?;
    Ok(MirrorReport {
        copied,
        missing,
        pushed: true,
    })
}

/// Synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No child repository is configured.
    #[error("no child repository configured, set child.repo")]
    ChildNotConfigured,

    /// A source file exists but cannot be read.
    #[error("failed to read {:?}", path.display())]
    ReadFile {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Manifest or settings handling fails.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Git plumbing fails.
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// GitHub access fails.
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    /// No scratch workspace can be determined.
    #[error(transparent)]
    Workspace(#[from] path::NoWayHome),

    /// A clone task dies before delivering its result.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
