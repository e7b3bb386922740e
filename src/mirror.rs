// SPDX-FileCopyrightText: 2026 Downstream contributors <downstream@crates.dev>
// SPDX-License-Identifier: MIT

//! Working clone management.
//!
//! A [`Mirror`] is a fresh working clone of the child repository, plus the
//! git plumbing the synchronization flow needs: remote management, branch
//! checkout, blob comparisons across refs, staging, committing, and pushing.
//!
//! # Fresh Clones
//!
//! Runs always start from a clone made on the spot. Any stale clone left in
//! the scratch workspace by an earlier run gets scrubbed first, so local
//! state can never leak between runs. History is never rewritten either: the
//! mirror only adds commits on top of whatever the remote already holds and
//! pushes them without force.
//!
//! # Blob Comparisons
//!
//! Divergence between parent and child is decided by comparing blob ids of
//! `<ref>:<path>` pairs. Content that hashes the same on both sides is
//! already in sync no matter how it got there, and a missing path is simply
//! "no id", which makes additions and deletions fall out of the same
//! comparison.

pub mod remote;

use crate::mirror::remote::{RemoteAuth, RemoteError, RemoteLink};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    BranchType, Commit, ErrorCode, IndexAddOption, Oid, Repository,
};
use indicatif::ProgressBar;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Working clone of the child repository.
pub struct Mirror {
    repository: Repository,
    workdir: PathBuf,
    auth: RemoteAuth,
}

impl Mirror {
    /// Clone a repository into `path`, scrubbing any stale clone first.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::ScrubWorkspace`] if a stale clone cannot be
    ///   removed.
    /// - Return [`MirrorError::CreateDirectory`] if the scratch workspace
    ///   cannot be created.
    /// - Return [`MirrorError::CloneRepository`] if the clone itself fails.
    #[instrument(skip(auth, bar), level = "debug")]
    pub fn clone(url: &str, path: &Path, auth: RemoteAuth, bar: ProgressBar) -> Result<Self> {
        if path.exists() {
            debug!("scrubbing stale clone at {:?}", path.display());
            fs::remove_dir_all(path).map_err(|err| MirrorError::ScrubWorkspace {
                source: err,
                path: path.to_path_buf(),
            })?;
        }
        if let Some(parent) = path.parent() {
            let _ = mkdirp::mkdirp(parent).map_err(|err| MirrorError::CreateDirectory {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }

        info!("cloning {url}");
        let link = RemoteLink::new(&auth, bar, url)?;
        let repository = RepoBuilder::new()
            .fetch_options(link.fetch_options())
            .clone(url, path)
            .map_err(|err| MirrorError::CloneRepository {
                source: err,
                url: url.to_string(),
            })?;
        link.finish();

        let workdir = repository
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| MirrorError::MissingWorkTree {
                path: path.to_path_buf(),
            })?;

        Ok(Self {
            repository,
            workdir,
            auth,
        })
    }

    /// Absolute path of the work tree.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Pin the commit identity of this clone to the bot.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Git2`] if the repository configuration cannot
    ///   be written.
    pub fn set_bot_identity(&self, name: &str, email: &str) -> Result<()> {
        let mut config = self.repository.config()?;
        config.set_str("user.name", name)?;
        config.set_str("user.email", email)?;
        Ok(())
    }

    /// Register a remote under `name` unless it already exists.
    ///
    /// An existing remote is left untouched, URL included, matching how git
    /// itself refuses to re-add a remote.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Git2`] if the remote cannot be registered.
    pub fn ensure_remote(&self, name: &str, url: &str) -> Result<()> {
        let exists = self
            .repository
            .remotes()?
            .iter()
            .flatten()
            .any(|existing| existing == name);
        if !exists {
            debug!("registering remote {name} at {url}");
            self.repository.remote(name, url)?;
        }
        Ok(())
    }

    /// Fetch every head of a remote, refreshing its remote-tracking refs.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Git2`] if the fetch fails.
    #[instrument(skip(self, bar), level = "debug")]
    pub fn fetch_remote(&self, name: &str, bar: ProgressBar) -> Result<()> {
        debug!("fetching remote {name}");
        let link = RemoteLink::new(&self.auth, bar, name)?;
        let mut remote = self.repository.find_remote(name)?;
        let mut options = link.fetch_options();
        remote.fetch(&[] as &[&str], Some(&mut options), None)?;
        link.finish();
        Ok(())
    }

    /// Check out the sync branch, reusing the remote tip when one exists.
    ///
    /// When `origin/<name>` exists the local branch is reset to it, so
    /// repeated runs for the same source pull request keep extending one
    /// branch. Otherwise the branch starts from HEAD, or stays unborn when
    /// the clone has no commits at all.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Git2`] if branch lookup, creation, or
    ///   checkout fails.
    #[instrument(skip(self), level = "debug")]
    pub fn checkout_sync_branch(&self, name: &str) -> Result<()> {
        match self
            .repository
            .find_branch(&format!("origin/{name}"), BranchType::Remote)
        {
            Ok(upstream) => {
                debug!("sync branch {name} exists on origin, reusing its tip");
                let tip = upstream.get().peel_to_commit()?;
                self.repository.branch(name, &tip, true)?;
            }
            Err(err) if err.code() == ErrorCode::NotFound => {
                debug!("creating sync branch {name}");
                if let Ok(head) = self.repository.head() {
                    let tip = head.peel_to_commit()?;
                    self.repository.branch(name, &tip, true)?;
                }
                // Unborn HEAD: the branch comes into being with the first
                // commit instead.
            }
            Err(err) => return Err(err.into()),
        }

        self.repository.set_head(&format!("refs/heads/{name}"))?;
        if self.repository.head().is_ok() {
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            self.repository.checkout_head(Some(&mut checkout))?;
        }
        Ok(())
    }

    /// Blob id of `refname:path`, or [`None`] when the path has no blob
    /// under that ref.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Revparse`] if the lookup fails for a reason
    ///   other than the path or ref being absent.
    pub fn blob_id(&self, refname: &str, path: &str) -> Result<Option<Oid>> {
        let spec = format!("{refname}:{path}");
        match self.repository.revparse_single(&spec) {
            Ok(object) => Ok(Some(object.id())),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(MirrorError::Revparse { source: err, spec }),
        }
    }

    /// Raw bytes of the blob at `refname:path`.
    ///
    /// Returns [`None`] when the path has no blob under that ref, or when it
    /// resolves to a directory rather than a file.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Revparse`] if the lookup fails for a reason
    ///   other than the path or ref being absent.
    pub fn read_blob(&self, refname: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let spec = format!("{refname}:{path}");
        match self.repository.revparse_single(&spec) {
            Ok(object) => Ok(object
                .into_blob()
                .ok()
                .map(|blob| blob.content().to_vec())),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(MirrorError::Revparse { source: err, spec }),
        }
    }

    /// Check whether a work tree file exists at a repository-relative path.
    pub fn work_file_exists(&self, rel: &str) -> bool {
        self.workdir.join(rel).exists()
    }

    /// Write raw bytes to a repository-relative path, creating parents.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::CreateDirectory`] if a parent directory
    ///   cannot be created.
    /// - Return [`MirrorError::WriteFile`] if the file cannot be written.
    pub fn write_file(&self, rel: &str, bytes: &[u8]) -> Result<()> {
        let target = self.workdir.join(rel);
        if let Some(parent) = target.parent() {
            let _ = mkdirp::mkdirp(parent).map_err(|err| MirrorError::CreateDirectory {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }
        fs::write(&target, bytes).map_err(|err| MirrorError::WriteFile {
            source: err,
            path: target.clone(),
        })?;
        Ok(())
    }

    /// Stage one repository-relative path.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Git2`] if the index cannot be updated.
    pub fn stage(&self, rel: &str) -> Result<()> {
        let mut index = self.repository.index()?;
        index.add_path(Path::new(rel))?;
        index.write()?;
        Ok(())
    }

    /// Remove a file from the work tree and stage its removal.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::RemoveFile`] if the work tree file cannot be
    ///   deleted.
    /// - Return [`MirrorError::Git2`] if the index cannot be updated.
    pub fn stage_removal(&self, rel: &str) -> Result<()> {
        let target = self.workdir.join(rel);
        if target.exists() {
            fs::remove_file(&target).map_err(|err| MirrorError::RemoveFile {
                source: err,
                path: target.clone(),
            })?;
        }
        let mut index = self.repository.index()?;
        if index.get_path(Path::new(rel), 0).is_some() {
            index.remove_path(Path::new(rel))?;
            index.write()?;
        }
        Ok(())
    }

    /// Stage every addition and modification in the work tree.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Git2`] if the index cannot be updated.
    pub fn stage_all(&self) -> Result<()> {
        let mut index = self.repository.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.write()?;
        Ok(())
    }

    /// Check whether the index differs from HEAD.
    ///
    /// An unborn HEAD counts as an empty tree, so anything staged in a fresh
    /// repository registers as a change.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Git2`] if the comparison fails.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let head_tree = match self.repository.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            Err(err)
                if err.code() == ErrorCode::UnbornBranch
                    || err.code() == ErrorCode::NotFound =>
            {
                None
            }
            Err(err) => return Err(err.into()),
        };
        let index = self.repository.index()?;
        let diff = self
            .repository
            .diff_tree_to_index(head_tree.as_ref(), Some(&index), None)?;
        Ok(diff.deltas().len() > 0)
    }

    /// Commit the index onto HEAD, refusing empty commits.
    ///
    /// Returns the new commit id, or [`None`] when the staged tree matches
    /// the current HEAD tree exactly; git refuses such commits and so does
    /// the mirror. An unborn HEAD produces a parentless first commit.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Git2`] if writing the tree or the commit
    ///   fails.
    #[instrument(skip(self), level = "debug")]
    pub fn commit(&self, message: &str) -> Result<Option<Oid>> {
        let mut index = self.repository.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repository.find_tree(tree_id)?;

        let head_commit = match self.repository.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(err)
                if err.code() == ErrorCode::UnbornBranch
                    || err.code() == ErrorCode::NotFound =>
            {
                None
            }
            Err(err) => return Err(err.into()),
        };
        if let Some(parent) = &head_commit {
            if parent.tree_id() == tree_id {
                debug!("index matches HEAD, refusing an empty commit");
                return Ok(None);
            }
        }

        let signature = self.repository.signature()?;
        let parents: Vec<&Commit<'_>> = head_commit.iter().collect();
        let oid = self
            .repository
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        info!("committed {oid}: {message}");
        Ok(Some(oid))
    }

    /// Push a local branch to the same name on origin.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Git2`] if the push fails or gets rejected.
    pub fn push_branch(&self, branch: &str, bar: ProgressBar) -> Result<()> {
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.push_refspec(&refspec, bar)
    }

    /// Push the currently checked out branch to `branch` on origin.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Git2`] if HEAD is unborn or the push fails.
    pub fn push_head_to(&self, branch: &str, bar: ProgressBar) -> Result<()> {
        let head = self.repository.head()?;
        let source = head
            .name()
            .ok_or_else(|| git2::Error::from_str("HEAD is not valid utf-8"))?;
        let refspec = format!("{source}:refs/heads/{branch}");
        self.push_refspec(&refspec, bar)
    }

    #[instrument(skip(self, bar), level = "debug")]
    fn push_refspec(&self, refspec: &str, bar: ProgressBar) -> Result<()> {
        info!("pushing {refspec} to origin");
        let link = RemoteLink::new(&self.auth, bar, refspec)?;
        let mut remote = self.repository.find_remote("origin")?;
        let mut options = link.push_options();
        remote.push(&[refspec], Some(&mut options))?;
        link.finish();
        Ok(())
    }

    /// Count the commits on `branch` that `origin/<base>` lacks.
    ///
    /// A base branch that was never pushed counts as empty, so every commit
    /// reachable from the branch tip counts.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Revparse`] if the branch tip cannot be
    ///   resolved.
    /// - Return [`MirrorError::Git2`] if the graph walk fails.
    pub fn commits_ahead(&self, branch: &str, base: &str) -> Result<usize> {
        let spec = format!("refs/heads/{branch}");
        let local = self
            .repository
            .revparse_single(&spec)
            .map_err(|err| MirrorError::Revparse { source: err, spec })?
            .id();

        let base_spec = format!("refs/remotes/origin/{base}");
        match self.repository.revparse_single(&base_spec) {
            Ok(upstream) => {
                let (ahead, _behind) = self.repository.graph_ahead_behind(local, upstream.id())?;
                Ok(ahead)
            }
            Err(err) if err.code() == ErrorCode::NotFound => {
                let mut walk = self.repository.revwalk()?;
                walk.push(local)?;
                Ok(walk.count())
            }
            Err(err) => Err(MirrorError::Revparse {
                source: err,
                spec: base_spec,
            }),
        }
    }
}

/// Mirror error types.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// A stale clone could not be scrubbed from the workspace.
    #[error("failed to scrub stale clone at {:?}", path.display())]
    ScrubWorkspace {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// A directory could not be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDirectory {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// The clone itself failed.
    #[error("failed to clone {url}")]
    CloneRepository {
        #[source]
        source: git2::Error,
        url: String,
    },

    /// The clone came back without a work tree.
    #[error("clone at {:?} has no work tree", path.display())]
    MissingWorkTree { path: PathBuf },

    /// A work tree file could not be written.
    #[error("failed to write {:?}", path.display())]
    WriteFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// A work tree file could not be removed.
    #[error("failed to remove {:?}", path.display())]
    RemoveFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// A revision lookup failed.
    #[error("failed to resolve {spec}")]
    Revparse {
        #[source]
        source: git2::Error,
        spec: String,
    },

    /// Remote transport plumbing fails.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
type Result<T, E = MirrorError> = std::result::Result<T, E>;
