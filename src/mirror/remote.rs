// SPDX-FileCopyrightText: 2026 Downstream contributors <downstream@crates.dev>
// SPDX-License-Identifier: MIT

//! Remote transport plumbing.
//!
//! Bundle the credential and progress reporting callbacks that every clone,
//! fetch, and push needs. Token credentials come first so CI runs never hang,
//! with git credential helpers and interactive prompts as the fallback for
//! local use.

use auth_git2::{GitAuthenticator, Prompter};
use git2::{Config, FetchOptions, PushOptions, RemoteCallbacks};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{env, fmt, path::Path, time};
use tracing::{info, instrument};

/// Token material used to authenticate against remotes.
///
/// Holds at most one access token. Operations against local paths never
/// trigger the callbacks, so an empty value works fine for file system
/// remotes and for users relying on their git credential helpers.
#[derive(Clone)]
pub struct RemoteAuth {
    token: Option<String>,
}

impl RemoteAuth {
    /// Wrap an already resolved token.
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// Resolve a token from an explicit value or the environment.
    ///
    /// Precedence follows the conventions of GitHub runners: an explicit
    /// value wins, then `GH_TOKEN`, then `GITHUB_TOKEN`.
    pub fn resolve(explicit: Option<String>) -> Self {
        let token = explicit
            .or_else(|| env::var("GH_TOKEN").ok())
            .or_else(|| env::var("GITHUB_TOKEN").ok());
        Self { token }
    }

    /// View the resolved token, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

impl fmt::Debug for RemoteAuth {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("RemoteAuth")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One remote operation's worth of callbacks and progress reporting.
///
/// Construct a link per clone, fetch, or push. The progress bar is styled
/// and ticking for the duration of the link, and gets suspended whenever the
/// authenticator has to prompt for credentials.
pub(crate) struct RemoteLink {
    authenticator: GitAuthenticator,
    config: Config,
    bar: ProgressBar,
}

impl RemoteLink {
    /// Construct a new link whose progress bar shows `message`.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::IndicatifStyleTemplate`] if the progress bar
    ///   style cannot be set.
    /// - Return [`RemoteError::Git2`] if the default git configuration
    ///   cannot be opened.
    pub(crate) fn new(
        auth: &RemoteAuth,
        bar: ProgressBar,
        message: impl Into<String>,
    ) -> Result<Self> {
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(message.into());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        let prompter = IndicatifPrompter::new(bar.clone());
        let mut authenticator = GitAuthenticator::default().set_prompter(prompter);
        if let Some(token) = auth.token() {
            // INVARIANT: Token credentials take priority over interactive
            // mechanisms so unattended runs never block on a prompt.
            authenticator = authenticator.add_plaintext_credentials("*", "x-access-token", token);
        }
        let config = Config::open_default()?;

        Ok(Self {
            authenticator,
            config,
            bar,
        })
    }

    /// Callbacks carrying credentials and throttled progress updates.
    pub(crate) fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut throttle = time::Instant::now();
        let bar = self.bar.clone();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(self.authenticator.credentials(&self.config));
        rc.transfer_progress(move |progress| {
            let stats = progress.to_owned();
            let bar_size = stats.total_objects() as u64;
            let bar_pos = stats.received_objects() as u64;
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                bar.set_length(bar_size);
                bar.set_position(bar_pos);
            }
            true
        });
        rc
    }

    /// Fetch options wired up with this link's callbacks.
    pub(crate) fn fetch_options(&self) -> FetchOptions<'_> {
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.callbacks());
        options
    }

    /// Push options wired up with this link's callbacks.
    pub(crate) fn push_options(&self) -> PushOptions<'_> {
        let mut options = PushOptions::new();
        options.remote_callbacks(self.callbacks());
        options
    }

    /// Tear the progress bar down.
    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Remote transport error types.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
type Result<T, E = RemoteError> = std::result::Result<T, E>;
