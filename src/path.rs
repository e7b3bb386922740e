// SPDX-FileCopyrightText: 2026 Downstream contributors <downstream@crates.dev>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevant path information for the scratch space that working
//! clones get placed into.

use std::path::PathBuf;

/// Determine default absolute path to the scratch workspace.
///
/// Uses XDG Base Directory path `$XDG_CACHE_HOME/downstream` as the default
/// location for working clones. Everything under it is disposable: clones are
/// scrubbed and recreated on every run. Does not check if the path returned
/// actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if the cache directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_workspace_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|path| path.join("downstream"))
        .ok_or(NoWayHome)
}

/// No way to determine user's cache directory.
///
/// # See Also
///
/// - [`dirs::cache_dir`](https://docs.rs/dirs/latest/dirs/fn.cache_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's cache directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
