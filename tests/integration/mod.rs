// SPDX-FileCopyrightText: 2026 Downstream contributors <downstream@crates.dev>
// SPDX-License-Identifier: MIT

//! End to end passes against local bare repositories.
//!
//! Every test stands up bare fixtures playing the parent and child remotes,
//! points `github.remote_root` at their parent directory so derived URLs
//! resolve to local paths, and drives [`SyncSession`] with a scripted GitHub
//! implementation instead of a live `gh` binary.

use crate::RepoFixture;
use anyhow::Result;
use downstream::{
    config::{LabelSettings, RepoSlug, Settings, SyncManifest},
    github::{self, ChangedFile, GitHubError, GitHubOps, PullRequest, PullRequestDraft},
    mirror::remote::RemoteAuth,
    sync::{
        run_full_mirror, MirrorReport, PullRequestOutcome, SyncAction, SyncError, SyncOutcome,
        SyncSession,
    },
};
use indoc::indoc;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{cell::RefCell, path::Path};

const MANIFEST: &str = indoc! {r#"
    [
      {"source": "tool/lib.py", "target": "lib.py"},
      {"source": "tool/data.bin", "target": "data.bin"}
    ]
"#};

/// Scripted stand-in for the `gh` CLI.
///
/// The `fail_*` switches make individual operations report a command
/// failure, the way a broken `gh` invocation would.
#[derive(Default)]
struct ScriptedGitHub {
    pr: Option<PullRequest>,
    labels: RefCell<Vec<String>>,
    open_prs: RefCell<Vec<u64>>,
    created: RefCell<Vec<PullRequestDraft>>,
    comments: RefCell<Vec<(u64, String)>>,
    fail_labels: bool,
    fail_create_label: bool,
    fail_create_pr: bool,
    fail_comment: bool,
}

impl ScriptedGitHub {
    fn new(pr: Option<PullRequest>) -> Self {
        Self {
            pr,
            ..Self::default()
        }
    }
}

fn scripted_failure(command: &'static str) -> GitHubError {
    GitHubError::CommandFailed {
        command,
        stderr: "scripted failure".into(),
    }
}

impl GitHubOps for ScriptedGitHub {
    fn view_pr(&self, _repo: &RepoSlug, _number: u64) -> github::Result<Option<PullRequest>> {
        Ok(self.pr.clone())
    }

    fn labels(&self, _repo: &RepoSlug) -> github::Result<Vec<String>> {
        if self.fail_labels {
            return Err(scripted_failure("label list"));
        }
        Ok(self.labels.borrow().clone())
    }

    fn create_label(&self, _repo: &RepoSlug, label: &LabelSettings) -> github::Result<()> {
        if self.fail_create_label {
            return Err(scripted_failure("label create"));
        }
        self.labels.borrow_mut().push(label.name.clone());
        Ok(())
    }

    fn open_pr_numbers(&self, _repo: &RepoSlug, _head: &str) -> github::Result<Vec<u64>> {
        Ok(self.open_prs.borrow().clone())
    }

    fn create_pr(&self, _repo: &RepoSlug, draft: &PullRequestDraft) -> github::Result<()> {
        if self.fail_create_pr {
            return Err(scripted_failure("pr create"));
        }
        self.created.borrow_mut().push(draft.clone());
        let number = 100 + self.created.borrow().len() as u64;
        self.open_prs.borrow_mut().push(number);
        Ok(())
    }

    fn comment(&self, _repo: &RepoSlug, number: u64, body: &str) -> github::Result<()> {
        if self.fail_comment {
            return Err(scripted_failure("pr comment"));
        }
        self.comments.borrow_mut().push((number, body.to_string()));
        Ok(())
    }
}

/// Settings whose derived remote URLs resolve under `store`.
fn store_settings(store: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.child.repo = Some("acme/child".parse().unwrap());
    settings.github.remote_root = store.to_string_lossy().into_owned();
    settings.sync.workspace = Some(store.join("workspace"));
    settings
}

fn pull_request(head: &str, base: &str, merged_at: Option<&str>, files: &[&str]) -> PullRequest {
    PullRequest {
        head_ref_name: head.into(),
        base_ref_name: base.into(),
        merged_at: merged_at.map(String::from),
        files: files
            .iter()
            .map(|path| ChangedFile {
                path: (*path).into(),
            })
            .collect(),
    }
}

#[sealed_test]
fn syncs_diverged_files_and_opens_pull_request() -> Result<()> {
    let store = std::env::current_dir()?.join("store");

    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("autosync/files.json", MANIFEST)?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.branch_from_head("feature-tooling")?;
    parent.stage_and_commit_to("refs/heads/feature-tooling", "tool/lib.py", "print('v2')\n")?;
    parent.stage_and_commit_to(
        "refs/heads/feature-tooling",
        "tool/data.bin",
        [0u8, 159, 146, 150],
    )?;

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("autosync/files.json", MANIFEST)?;
    child.stage_and_commit("lib.py", "print('v1')\n")?;
    child.stage_and_commit("README.md", "# Child\n")?;

    let settings = store_settings(&store);
    let github = ScriptedGitHub::new(Some(pull_request(
        "feature-tooling",
        "main",
        None,
        &["tool/lib.py", "tool/data.bin"],
    )));
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let session = SyncSession::new(&settings, RemoteAuth::new(None), &github);
    let report = session.run(&parent_slug, 12)?;

    let branch = "auto-update-from-acme-parent-pr-12";
    assert_eq!(report.branch, branch);
    assert!(!report.manifest_changed);
    assert_eq!(
        report.outcome,
        SyncOutcome::Pushed {
            pull_request: PullRequestOutcome::Created,
        }
    );

    assert_eq!(
        child.blob_text(branch, "lib.py").as_deref(),
        Some("print('v2')\n")
    );
    assert_eq!(
        child.blob_bytes(branch, "data.bin"),
        Some(vec![0, 159, 146, 150])
    );
    assert_eq!(
        child.tip_message(branch)?,
        "Sync changes from acme/parent PR 12"
    );

    let created = github.created.borrow();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].title, "[Automated] Sync from acme/parent PR 12");
    assert_eq!(
        created[0].body,
        "Automated synchronization from acme/parent PR #12"
    );
    assert_eq!(created[0].head, branch);
    assert_eq!(created[0].base, "main");
    assert_eq!(created[0].label, "automated pr");
    assert!(github
        .labels
        .borrow()
        .iter()
        .any(|label| label == "automated pr"));

    Ok(())
}

#[sealed_test]
fn second_run_extends_the_branch_and_comments() -> Result<()> {
    let store = std::env::current_dir()?.join("store");
    let manifest = r#"[{"source": "tool/lib.py", "target": "lib.py"}]"#;

    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("autosync/files.json", manifest)?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.branch_from_head("feature-tooling")?;
    parent.stage_and_commit_to("refs/heads/feature-tooling", "tool/lib.py", "print('v2')\n")?;

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("autosync/files.json", manifest)?;
    child.stage_and_commit("lib.py", "print('v1')\n")?;

    let settings = store_settings(&store);
    let github = ScriptedGitHub::new(Some(pull_request(
        "feature-tooling",
        "main",
        None,
        &["tool/lib.py"],
    )));
    let parent_slug: RepoSlug = "acme/parent".parse()?;
    let session = SyncSession::new(&settings, RemoteAuth::new(None), &github);

    let first = session.run(&parent_slug, 12)?;
    assert_eq!(
        first.outcome,
        SyncOutcome::Pushed {
            pull_request: PullRequestOutcome::Created,
        }
    );

    // The source pull request picks up another commit before the next run.
    parent.stage_and_commit_to("refs/heads/feature-tooling", "tool/lib.py", "print('v3')\n")?;

    let second = session.run(&parent_slug, 12)?;
    assert_eq!(
        second.outcome,
        SyncOutcome::Pushed {
            pull_request: PullRequestOutcome::Commented(101),
        }
    );

    let branch = "auto-update-from-acme-parent-pr-12";
    assert_eq!(
        child.blob_text(branch, "lib.py").as_deref(),
        Some("print('v3')\n")
    );
    assert_eq!(child.commit_count(branch)?, 4);
    assert_eq!(github.created.borrow().len(), 1);
    assert_eq!(
        *github.comments.borrow(),
        vec![(101, "Automatically updated".to_string())]
    );

    Ok(())
}

#[sealed_test]
fn manifest_only_change_updates_the_mapping() -> Result<()> {
    let store = std::env::current_dir()?.join("store");
    let old_manifest = indoc! {r#"
        [
          {"source": "tool/lib.py", "target": "lib.py"}
        ]
    "#};
    let new_manifest = indoc! {r#"
        [
          {"source": "tool/lib.py", "target": "lib.py"},
          {"source": "docs/guide.md", "target": "guide.md"}
        ]
    "#};

    // The merged pull request only rewrote the manifest; every mapped file
    // already matches between parent and child.
    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.stage_and_commit("autosync/files.json", new_manifest)?;

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("lib.py", "print('v1')\n")?;
    child.stage_and_commit("autosync/files.json", old_manifest)?;

    let settings = store_settings(&store);
    let github = ScriptedGitHub::new(Some(pull_request(
        "feature-mapping",
        "main",
        Some("2026-03-14T09:26:53Z"),
        &["autosync/files.json"],
    )));
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let session = SyncSession::new(&settings, RemoteAuth::new(None), &github);
    let report = session.run(&parent_slug, 9)?;

    let branch = "auto-update-from-acme-parent-pr-9";
    assert!(report.manifest_changed);
    assert!(report.actions.is_empty());
    assert_eq!(
        report.outcome,
        SyncOutcome::Pushed {
            pull_request: PullRequestOutcome::Created,
        }
    );
    assert_eq!(
        child.tip_message(branch)?,
        "Update sync mapping from acme/parent PR 9"
    );
    assert_eq!(
        child.blob_text(branch, "autosync/files.json").as_deref(),
        Some(new_manifest)
    );

    Ok(())
}

#[sealed_test]
fn manifest_deleted_upstream_drops_the_mapping() -> Result<()> {
    let store = std::env::current_dir()?.join("store");
    let manifest = r#"[{"source": "tool/lib.py", "target": "lib.py"}]"#;

    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("autosync/files.json", manifest)?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.branch_from_head("feature-retire")?;
    parent.remove_and_commit_to("refs/heads/feature-retire", "autosync/files.json")?;

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("autosync/files.json", manifest)?;
    child.stage_and_commit("lib.py", "print('v1')\n")?;

    let settings = store_settings(&store);
    let github = ScriptedGitHub::new(Some(pull_request(
        "feature-retire",
        "main",
        None,
        &["autosync/files.json"],
    )));
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let session = SyncSession::new(&settings, RemoteAuth::new(None), &github);
    let report = session.run(&parent_slug, 6)?;

    let branch = "auto-update-from-acme-parent-pr-6";
    assert!(report.manifest_changed);
    assert!(report.actions.is_empty());
    assert_eq!(
        report.outcome,
        SyncOutcome::Pushed {
            pull_request: PullRequestOutcome::Created,
        }
    );
    assert_eq!(child.blob_text(branch, "autosync/files.json"), None);
    assert_eq!(
        child.blob_text(branch, "lib.py").as_deref(),
        Some("print('v1')\n")
    );
    assert_eq!(
        child.tip_message(branch)?,
        "Update sync mapping from acme/parent PR 6"
    );

    Ok(())
}

#[sealed_test]
fn manifest_escaping_the_repository_fails_the_run() -> Result<()> {
    let store = std::env::current_dir()?.join("store");
    let manifest = r#"[{"source": "tool/lib.py", "target": "lib.py"}]"#;
    let crafted = r#"[{"source": "tool/lib.py", "target": "../escape.py"}]"#;

    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("autosync/files.json", manifest)?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.branch_from_head("feature-crafty")?;
    parent.stage_and_commit_to("refs/heads/feature-crafty", "autosync/files.json", crafted)?;

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("autosync/files.json", manifest)?;
    child.stage_and_commit("lib.py", "print('v1')\n")?;

    let settings = store_settings(&store);
    let github = ScriptedGitHub::new(Some(pull_request(
        "feature-crafty",
        "main",
        None,
        &["autosync/files.json"],
    )));
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let session = SyncSession::new(&settings, RemoteAuth::new(None), &github);
    let error = session.run(&parent_slug, 11).unwrap_err();

    assert!(matches!(error, SyncError::Config(_)));
    assert!(!child.has_branch("auto-update-from-acme-parent-pr-11"));
    assert!(github.created.borrow().is_empty());

    Ok(())
}

#[sealed_test]
fn source_deletion_removes_the_target() -> Result<()> {
    let store = std::env::current_dir()?.join("store");
    let manifest = r#"[{"source": "tool/lib.py", "target": "lib.py"}]"#;

    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("autosync/files.json", manifest)?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.branch_from_head("feature-cleanup")?;
    parent.remove_and_commit_to("refs/heads/feature-cleanup", "tool/lib.py")?;

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("autosync/files.json", manifest)?;
    child.stage_and_commit("lib.py", "print('v1')\n")?;

    let settings = store_settings(&store);
    let github = ScriptedGitHub::new(Some(pull_request(
        "feature-cleanup",
        "main",
        None,
        &["tool/lib.py"],
    )));
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let session = SyncSession::new(&settings, RemoteAuth::new(None), &github);
    let report = session.run(&parent_slug, 4)?;

    let branch = "auto-update-from-acme-parent-pr-4";
    assert_eq!(
        report.actions,
        vec![SyncAction::Removed {
            target: "lib.py".into(),
        }]
    );
    assert_eq!(
        report.outcome,
        SyncOutcome::Pushed {
            pull_request: PullRequestOutcome::Created,
        }
    );
    assert_eq!(child.blob_text(branch, "lib.py"), None);
    assert_eq!(
        child.tip_message(branch)?,
        "Sync changes from acme/parent PR 4"
    );

    Ok(())
}

#[sealed_test]
fn no_divergence_leaves_the_child_alone() -> Result<()> {
    let store = std::env::current_dir()?.join("store");
    let manifest = r#"[{"source": "tool/lib.py", "target": "lib.py"}]"#;

    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("autosync/files.json", manifest)?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.branch_from_head("feature-notes")?;
    parent.stage_and_commit_to("refs/heads/feature-notes", "docs/notes.txt", "unmapped\n")?;

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("autosync/files.json", manifest)?;
    child.stage_and_commit("lib.py", "print('v1')\n")?;

    let settings = store_settings(&store);
    let github = ScriptedGitHub::new(Some(pull_request(
        "feature-notes",
        "main",
        None,
        &["docs/notes.txt"],
    )));
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let session = SyncSession::new(&settings, RemoteAuth::new(None), &github);
    let report = session.run(&parent_slug, 5)?;

    assert_eq!(report.outcome, SyncOutcome::NoChanges);
    assert!(!child.has_branch("auto-update-from-acme-parent-pr-5"));
    assert!(github.created.borrow().is_empty());
    assert!(github.comments.borrow().is_empty());
    assert!(github.labels.borrow().is_empty());

    Ok(())
}

#[sealed_test]
fn missing_manifest_on_both_sides_is_a_clean_no_op() -> Result<()> {
    let store = std::env::current_dir()?.join("store");

    // Neither repository has adopted a sync manifest yet.
    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.branch_from_head("feature-tooling")?;
    parent.stage_and_commit_to("refs/heads/feature-tooling", "tool/lib.py", "print('v2')\n")?;

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("README.md", "# Child\n")?;

    let settings = store_settings(&store);
    let github = ScriptedGitHub::new(Some(pull_request(
        "feature-tooling",
        "main",
        None,
        &["tool/lib.py"],
    )));
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let session = SyncSession::new(&settings, RemoteAuth::new(None), &github);
    let report = session.run(&parent_slug, 2)?;

    assert!(!report.manifest_changed);
    assert!(report.actions.is_empty());
    assert_eq!(report.outcome, SyncOutcome::NoChanges);
    assert!(!child.has_branch("auto-update-from-acme-parent-pr-2"));
    assert!(github.created.borrow().is_empty());

    Ok(())
}

#[sealed_test]
fn unreadable_pull_request_ends_quietly() -> Result<()> {
    let store = std::env::current_dir()?.join("store");

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("README.md", "# Child\n")?;

    let settings = store_settings(&store);
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let unreadable = ScriptedGitHub::new(None);
    let session = SyncSession::new(&settings, RemoteAuth::new(None), &unreadable);
    let report = session.run(&parent_slug, 8)?;
    assert_eq!(report.outcome, SyncOutcome::SourceUnavailable);

    let headless = ScriptedGitHub::new(Some(pull_request("", "main", None, &[])));
    let session = SyncSession::new(&settings, RemoteAuth::new(None), &headless);
    let report = session.run(&parent_slug, 8)?;
    assert_eq!(report.outcome, SyncOutcome::SourceUnavailable);

    assert!(!child.has_branch("auto-update-from-acme-parent-pr-8"));
    assert!(unreadable.created.borrow().is_empty());
    assert!(headless.created.borrow().is_empty());

    Ok(())
}

#[sealed_test]
fn comment_failure_still_reports_the_update() -> Result<()> {
    let store = std::env::current_dir()?.join("store");
    let manifest = r#"[{"source": "tool/lib.py", "target": "lib.py"}]"#;

    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("autosync/files.json", manifest)?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.branch_from_head("feature-tooling")?;
    parent.stage_and_commit_to("refs/heads/feature-tooling", "tool/lib.py", "print('v2')\n")?;

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("autosync/files.json", manifest)?;
    child.stage_and_commit("lib.py", "print('v1')\n")?;

    let settings = store_settings(&store);
    let github = ScriptedGitHub {
        fail_comment: true,
        ..ScriptedGitHub::new(Some(pull_request(
            "feature-tooling",
            "main",
            None,
            &["tool/lib.py"],
        )))
    };
    // Pull request 7 already tracks the sync branch.
    github.open_prs.borrow_mut().push(7);
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let session = SyncSession::new(&settings, RemoteAuth::new(None), &github);
    let report = session.run(&parent_slug, 12)?;

    assert_eq!(
        report.outcome,
        SyncOutcome::Pushed {
            pull_request: PullRequestOutcome::Commented(7),
        }
    );
    assert!(github.comments.borrow().is_empty());
    assert_eq!(
        child
            .blob_text("auto-update-from-acme-parent-pr-12", "lib.py")
            .as_deref(),
        Some("print('v2')\n")
    );

    Ok(())
}

#[sealed_test]
fn label_trouble_does_not_block_pull_request_creation() -> Result<()> {
    let store = std::env::current_dir()?.join("store");
    let manifest = r#"[{"source": "tool/lib.py", "target": "lib.py"}]"#;

    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("autosync/files.json", manifest)?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.branch_from_head("feature-tooling")?;
    parent.stage_and_commit_to("refs/heads/feature-tooling", "tool/lib.py", "print('v2')\n")?;

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("autosync/files.json", manifest)?;
    child.stage_and_commit("lib.py", "print('v1')\n")?;

    let settings = store_settings(&store);
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let listing_fails = ScriptedGitHub {
        fail_labels: true,
        ..ScriptedGitHub::new(Some(pull_request(
            "feature-tooling",
            "main",
            None,
            &["tool/lib.py"],
        )))
    };
    let session = SyncSession::new(&settings, RemoteAuth::new(None), &listing_fails);
    let report = session.run(&parent_slug, 12)?;
    assert_eq!(
        report.outcome,
        SyncOutcome::Pushed {
            pull_request: PullRequestOutcome::Created,
        }
    );
    assert_eq!(listing_fails.created.borrow().len(), 1);

    let creation_fails = ScriptedGitHub {
        fail_create_label: true,
        ..ScriptedGitHub::new(Some(pull_request(
            "feature-tooling",
            "main",
            None,
            &["tool/lib.py"],
        )))
    };
    let session = SyncSession::new(&settings, RemoteAuth::new(None), &creation_fails);
    let report = session.run(&parent_slug, 13)?;
    assert_eq!(
        report.outcome,
        SyncOutcome::Pushed {
            pull_request: PullRequestOutcome::Created,
        }
    );
    assert_eq!(creation_fails.created.borrow().len(), 1);
    assert!(creation_fails.labels.borrow().is_empty());

    Ok(())
}

#[sealed_test]
fn pull_request_creation_failure_fails_the_run() -> Result<()> {
    let store = std::env::current_dir()?.join("store");
    let manifest = r#"[{"source": "tool/lib.py", "target": "lib.py"}]"#;

    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("autosync/files.json", manifest)?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.branch_from_head("feature-tooling")?;
    parent.stage_and_commit_to("refs/heads/feature-tooling", "tool/lib.py", "print('v2')\n")?;

    let child = RepoFixture::bare(store.join("acme/child.git"))?;
    child.stage_and_commit("autosync/files.json", manifest)?;
    child.stage_and_commit("lib.py", "print('v1')\n")?;

    let settings = store_settings(&store);
    let github = ScriptedGitHub {
        fail_create_pr: true,
        ..ScriptedGitHub::new(Some(pull_request(
            "feature-tooling",
            "main",
            None,
            &["tool/lib.py"],
        )))
    };
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let session = SyncSession::new(&settings, RemoteAuth::new(None), &github);
    let error = session.run(&parent_slug, 12).unwrap_err();

    assert!(matches!(error, SyncError::GitHub(_)));
    // The branch landed on the remote before creation fell over.
    assert!(child.has_branch("auto-update-from-acme-parent-pr-12"));
    assert!(github.created.borrow().is_empty());

    Ok(())
}

#[sealed_test]
fn seeds_an_empty_child() -> Result<()> {
    let store = std::env::current_dir()?.join("store");
    let manifest = indoc! {r#"
        [
          {"source": "tool/lib.py", "target": "lib.py"},
          {"source": "tool/config.toml", "target": "config.toml"}
        ]
    "#};

    let parent = RepoFixture::bare(store.join("acme/parent.git"))?;
    parent.stage_and_commit("autosync/files.json", manifest)?;
    parent.stage_and_commit("tool/lib.py", "print('v1')\n")?;
    parent.stage_and_commit("tool/config.toml", "[tool]\n")?;
    parent.branch_from_head("feature-seed")?;

    // The child exists but holds no commits at all.
    let child = RepoFixture::bare(store.join("acme/child.git"))?;

    let settings = store_settings(&store);
    let github = ScriptedGitHub::new(Some(pull_request(
        "feature-seed",
        "main",
        None,
        &["tool/lib.py", "tool/config.toml"],
    )));
    let parent_slug: RepoSlug = "acme/parent".parse()?;

    let session = SyncSession::new(&settings, RemoteAuth::new(None), &github);
    let report = session.run(&parent_slug, 3)?;

    let branch = "auto-update-from-acme-parent-pr-3";
    assert!(report.manifest_changed);
    assert_eq!(
        report.outcome,
        SyncOutcome::Pushed {
            pull_request: PullRequestOutcome::Created,
        }
    );
    assert_eq!(child.commit_count(branch)?, 1);
    assert_eq!(
        child.blob_text(branch, "lib.py").as_deref(),
        Some("print('v1')\n")
    );
    assert_eq!(
        child.blob_text(branch, "config.toml").as_deref(),
        Some("[tool]\n")
    );
    assert_eq!(
        child.blob_text(branch, "autosync/files.json").as_deref(),
        Some(manifest)
    );
    assert_eq!(
        child.tip_message(branch)?,
        "Sync changes from acme/parent PR 3"
    );

    Ok(())
}

#[sealed_test]
fn full_mirror_copies_mapped_files() -> Result<()> {
    let store = std::env::current_dir()?.join("store");
    let manifest: SyncManifest = indoc! {r#"
        [
          {"source": "tool/lib.py", "target": "lib.py"},
          {"source": "tool/data.bin", "target": "data.bin"},
          {"source": "tool/missing.txt", "target": "missing.txt"}
        ]
    "#}
    .parse()?;

    let source = RepoFixture::bare(store.join("source.git"))?;
    source.stage_and_commit("tool/lib.py", "print('hello')\n")?;
    source.stage_and_commit("tool/data.bin", [7u8, 0, 255])?;

    let target = RepoFixture::bare(store.join("target.git"))?;
    target.stage_and_commit("README.md", "# Target\n")?;

    let settings = store_settings(&store);
    let source_url = store.join("source.git").to_string_lossy().into_owned();
    let target_url = store.join("target.git").to_string_lossy().into_owned();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(run_full_mirror(
        &settings,
        RemoteAuth::new(None),
        &source_url,
        &target_url,
        &manifest,
    ))?;

    assert_eq!(
        report,
        MirrorReport {
            copied: 2,
            missing: 1,
            pushed: true,
        }
    );
    assert_eq!(target.tip_message("main")?, "Auto-sync files");
    assert_eq!(
        target.blob_text("main", "lib.py").as_deref(),
        Some("print('hello')\n")
    );
    assert_eq!(target.blob_bytes("main", "data.bin"), Some(vec![7, 0, 255]));
    assert_eq!(
        target.blob_text("main", "README.md").as_deref(),
        Some("# Target\n")
    );

    // A second pass finds nothing new to push.
    let report = runtime.block_on(run_full_mirror(
        &settings,
        RemoteAuth::new(None),
        &source_url,
        &target_url,
        &manifest,
    ))?;
    assert_eq!(
        report,
        MirrorReport {
            copied: 2,
            missing: 1,
            pushed: false,
        }
    );
    assert_eq!(target.commit_count("main")?, 2);

    Ok(())
}
