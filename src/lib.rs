// SPDX-FileCopyrightText: 2026 Downstream contributors <downstream@crates.dev>
// SPDX-License-Identifier: MIT

//! Keep a child repository in lockstep with its parent.
//!
//! Downstream watches pull requests in a __parent__ repository and carries
//! the files they touch into a __child__ repository, guided by a JSON
//! manifest of `source` to `target` path mappings. Divergence is decided by
//! comparing blob ids between the parent ref and the child's base branch, so
//! already-synced files never produce noise commits. Synced changes land on a
//! deterministic branch in the child, and the matching pull request is opened
//! once and commented on afterwards.
//!
//! The crate splits along the seams of that pipeline:
//!
//! - [`config`] parses tool settings and the sync manifest.
//! - [`mirror`] wraps the child clone and all raw Git plumbing.
//! - [`github`] talks to GitHub through the `gh` CLI.
//! - [`sync`] drives the whole flow, deciding what to copy, remove, commit,
//!   and announce.

pub mod config;
pub mod github;
pub mod mirror;
pub mod path;
pub mod sync;

pub use config::{RepoSlug, Settings, SyncEntry, SyncManifest};
pub use mirror::Mirror;
pub use sync::{SyncReport, SyncSession};
