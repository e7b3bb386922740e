// SPDX-FileCopyrightText: 2026 Downstream contributors <downstream@crates.dev>
// SPDX-License-Identifier: MIT

//! GitHub access.
//!
//! Everything the synchronization flow needs from GitHub sits behind the
//! [`GitHubOps`] trait: pull request metadata, label management, and pull
//! request lifecycle. The real implementation, [`GhClient`], shells out to
//! the `gh` CLI with `--json` payloads so no HTTP stack or token juggling
//! lives in this crate; tests drive the flow with a scripted implementation
//! instead.
//!
//! # Failure Policy
//!
//! `gh` reports "nothing there" and "something broke" through the same exit
//! code, so each operation decides how much failure it tolerates: metadata
//! reads degrade to empty results, pull request creation is a hard error,
//! and comments are best effort.

use crate::config::{LabelSettings, RepoSlug};
use serde::Deserialize;
use std::{path::PathBuf, process::Command, thread, time::Duration};
use tracing::{debug, warn};

/// Fields requested from `gh pr view`.
const VIEW_FIELDS: &str = "files,mergedAt,headRefName,baseRefName";

/// Labels are not always usable immediately after creation.
const LABEL_SETTLE: Duration = Duration::from_secs(2);

/// Layer of indirection for GitHub access.
pub trait GitHubOps {
    /// Metadata of one pull request, or [`None`] when it cannot be read.
    fn view_pr(&self, repo: &RepoSlug, number: u64) -> Result<Option<PullRequest>>;

    /// Names of every label defined on a repository.
    fn labels(&self, repo: &RepoSlug) -> Result<Vec<String>>;

    /// Create a label on a repository.
    fn create_label(&self, repo: &RepoSlug, label: &LabelSettings) -> Result<()>;

    /// Numbers of the open pull requests whose head is `head`.
    fn open_pr_numbers(&self, repo: &RepoSlug, head: &str) -> Result<Vec<u64>>;

    /// Open a new pull request.
    fn create_pr(&self, repo: &RepoSlug, draft: &PullRequestDraft) -> Result<()>;

    /// Comment on an existing pull request.
    fn comment(&self, repo: &RepoSlug, number: u64, body: &str) -> Result<()>;
}

/// Pull request metadata as reported by `gh pr view`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub head_ref_name: String,
    pub base_ref_name: String,

    /// Merge timestamp; [`None`] while the pull request is open.
    pub merged_at: Option<String>,

    /// Files the pull request touches.
    #[serde(default)]
    pub files: Vec<ChangedFile>,
}

impl PullRequest {
    /// Check whether the pull request has been merged.
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

/// One file a pull request touches.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangedFile {
    pub path: String,
}

/// Everything needed to open a pull request on the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub label: String,
    pub assignee: Option<String>,
    pub reviewer: Option<String>,
}

/// GitHub access through the `gh` CLI.
pub struct GhClient {
    program: PathBuf,
    token: Option<String>,
}

impl GhClient {
    /// Construct a new client around a `gh` binary.
    ///
    /// The token, when present, is handed to every invocation through
    /// `GH_TOKEN`; otherwise `gh` falls back to its own login state.
    pub fn new(program: impl Into<PathBuf>, token: Option<String>) -> Self {
        Self {
            program: program.into(),
            token,
        }
    }

    /// Run `gh` to completion, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - Return [`GitHubError::Spawn`] if the binary cannot be executed at
    ///   all. Exit status interpretation is left to the caller.
    fn run(&self, args: &[String]) -> Result<CliOutput> {
        debug!("gh {}", args.join(" "));
        let mut command = Command::new(&self.program);
        command.args(args);
        if let Some(token) = &self.token {
            command.env("GH_TOKEN", token);
        }
        let output = command.output().map_err(|err| GitHubError::Spawn {
            source: err,
            program: self.program.clone(),
        })?;

        Ok(CliOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr)
                .trim_end()
                .to_string(),
            success: output.status.success(),
        })
    }
}

impl GitHubOps for GhClient {
    /// Metadata of one pull request.
    ///
    /// A pull request that cannot be read is not an error: runs triggered
    /// for deleted or inaccessible pull requests should end quietly, so any
    /// failure here degrades to [`None`] with a warning.
    fn view_pr(&self, repo: &RepoSlug, number: u64) -> Result<Option<PullRequest>> {
        let out = self.run(&view_pr_args(repo, number))?;
        if !out.success || out.stdout.trim().is_empty() {
            warn!("failed to read pull request {number} from {repo}: {}", out.stderr);
            return Ok(None);
        }

        let pr = serde_json::from_str(&out.stdout).map_err(|err| GitHubError::Payload {
            source: err,
            command: "pr view",
        })?;
        Ok(Some(pr))
    }

    fn labels(&self, repo: &RepoSlug) -> Result<Vec<String>> {
        let out = self.run(&label_list_args(repo))?;
        if !out.success {
            return Err(GitHubError::CommandFailed {
                command: "label list",
                stderr: out.stderr,
            });
        }

        let labels: Vec<LabelName> =
            serde_json::from_str(&out.stdout).map_err(|err| GitHubError::Payload {
                source: err,
                command: "label list",
            })?;
        Ok(labels.into_iter().map(|label| label.name).collect())
    }

    fn create_label(&self, repo: &RepoSlug, label: &LabelSettings) -> Result<()> {
        let out = self.run(&label_create_args(repo, label))?;
        if !out.success {
            return Err(GitHubError::CommandFailed {
                command: "label create",
                stderr: out.stderr,
            });
        }
        thread::sleep(LABEL_SETTLE);
        Ok(())
    }

    /// Numbers of the open pull requests whose head is `head`.
    ///
    /// A listing failure degrades to an empty result; the flow then behaves
    /// as if no pull request existed yet, which at worst produces a
    /// duplicate-creation attempt that GitHub itself rejects.
    fn open_pr_numbers(&self, repo: &RepoSlug, head: &str) -> Result<Vec<u64>> {
        let out = self.run(&pr_list_args(repo, head))?;
        if !out.success {
            debug!("failed to list pull requests on {repo}: {}", out.stderr);
            return Ok(Vec::new());
        }

        let summaries: Vec<PrNumber> =
            serde_json::from_str(&out.stdout).map_err(|err| GitHubError::Payload {
                source: err,
                command: "pr list",
            })?;
        Ok(summaries.into_iter().map(|summary| summary.number).collect())
    }

    fn create_pr(&self, repo: &RepoSlug, draft: &PullRequestDraft) -> Result<()> {
        let out = self.run(&pr_create_args(repo, draft))?;
        if !out.success {
            return Err(GitHubError::CommandFailed {
                command: "pr create",
                stderr: out.stderr,
            });
        }
        Ok(())
    }

    fn comment(&self, repo: &RepoSlug, number: u64, body: &str) -> Result<()> {
        let out = self.run(&pr_comment_args(repo, number, body))?;
        if !out.success {
            return Err(GitHubError::CommandFailed {
                command: "pr comment",
                stderr: out.stderr,
            });
        }
        Ok(())
    }
}

/// Captured output of one `gh` invocation.
struct CliOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

#[derive(Debug, Deserialize)]
struct LabelName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PrNumber {
    number: u64,
}

fn view_pr_args(repo: &RepoSlug, number: u64) -> Vec<String> {
    vec![
        "pr".into(),
        "view".into(),
        number.to_string(),
        "--repo".into(),
        repo.to_string(),
        "--json".into(),
        VIEW_FIELDS.into(),
    ]
}

fn label_list_args(repo: &RepoSlug) -> Vec<String> {
    vec![
        "label".into(),
        "list".into(),
        "--repo".into(),
        repo.to_string(),
        "--json".into(),
        "name".into(),
    ]
}

fn label_create_args(repo: &RepoSlug, label: &LabelSettings) -> Vec<String> {
    vec![
        "label".into(),
        "create".into(),
        label.name.clone(),
        "--repo".into(),
        repo.to_string(),
        "--color".into(),
        label.color.clone(),
        "--description".into(),
        label.description.clone(),
    ]
}

fn pr_list_args(repo: &RepoSlug, head: &str) -> Vec<String> {
    vec![
        "pr".into(),
        "list".into(),
        "--repo".into(),
        repo.to_string(),
        "--head".into(),
        head.into(),
        "--json".into(),
        "number".into(),
    ]
}

fn pr_create_args(repo: &RepoSlug, draft: &PullRequestDraft) -> Vec<String> {
    let mut args = vec![
        "pr".into(),
        "create".into(),
        "--repo".into(),
        repo.to_string(),
        "--head".into(),
        draft.head.clone(),
        "--base".into(),
        draft.base.clone(),
        "--title".into(),
        draft.title.clone(),
        "--body".into(),
        draft.body.clone(),
        "--label".into(),
        draft.label.clone(),
    ];
    if let Some(assignee) = &draft.assignee {
        args.push("--assignee".into());
        args.push(assignee.clone());
    }
    if let Some(reviewer) = &draft.reviewer {
        args.push("--reviewer".into());
        args.push(reviewer.clone());
    }
    args
}

fn pr_comment_args(repo: &RepoSlug, number: u64, body: &str) -> Vec<String> {
    vec![
        "pr".into(),
        "comment".into(),
        number.to_string(),
        "--repo".into(),
        repo.to_string(),
        "--body".into(),
        body.into(),
    ]
}

/// GitHub access error types.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    /// The `gh` binary could not be executed.
    #[error("failed to spawn {:?}", program.display())]
    Spawn {
        #[source]
        source: std::io::Error,
        program: PathBuf,
    },

    /// A `gh` command exited unsuccessfully.
    #[error("gh {command} failed: {stderr}")]
    CommandFailed {
        command: &'static str,
        stderr: String,
    },

    /// A `gh` command produced JSON this crate cannot parse.
    #[error("gh {command} returned a malformed payload")]
    Payload {
        #[source]
        source: serde_json::Error,
        command: &'static str,
    },
}

/// Friendly result alias :3
pub type Result<T, E = GitHubError> = std::result::Result<T, E>;
