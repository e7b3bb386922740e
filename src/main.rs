// SPDX-FileCopyrightText: 2026 Downstream contributors <downstream@crates.dev>
// SPDX-License-Identifier: MIT

use downstream::{
    config::{RepoSlug, Settings, SyncManifest},
    github::GhClient,
    mirror::remote::RemoteAuth,
    sync::{run_full_mirror, SyncSession},
};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{debug, error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  downstream [options] sync <owner/repo> <pr_number>\n  downstream [options] mirror",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to the settings file.
    #[arg(
        short,
        long,
        value_name = "path",
        default_value = "downstream.toml",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        match self.command {
            Command::Sync(opts) => run_sync(&self.config, opts),
            Command::Mirror(opts) => run_mirror(&self.config, opts).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Synchronize the child with one pull request of the parent.
    #[command(override_usage = "downstream sync [options] <owner/repo> <pr_number>")]
    Sync(SyncOptions),

    /// Copy every mapped file from a source repository into a target.
    #[command(override_usage = "downstream mirror [options]")]
    Mirror(MirrorOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Parent repository the pull request lives in.
    #[arg(required = true, value_name = "owner/repo")]
    pub repo: RepoSlug,

    /// Number of the parent pull request to synchronize from.
    #[arg(required = true, value_name = "pr_number")]
    pub pr: u64,

    /// GitHub token used for remote access and API calls.
    #[arg(long, env = "GH_TOKEN", hide_env_values = true, value_name = "token")]
    pub token: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct MirrorOptions {
    /// URL of the repository to copy mapped files from.
    #[arg(long, env = "SOURCE_REPO_URL", value_name = "url")]
    pub source_url: Option<String>,

    /// URL of the repository to push mapped files into.
    #[arg(long, env = "TARGET_REPO_URL", value_name = "url")]
    pub target_url: Option<String>,

    /// Path to the sync manifest to mirror with.
    #[arg(long, env = "JSON_PATH", value_name = "path")]
    pub manifest: Option<PathBuf>,

    /// GitHub token used for remote access.
    #[arg(long, env = "GH_TOKEN", hide_env_values = true, value_name = "token")]
    pub token: Option<String>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer().compact().with_target(false).without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn run_sync(config: &Path, opts: SyncOptions) -> Result<()> {
    let settings = load_settings(config)?;
    let auth = RemoteAuth::resolve(opts.token);
    if auth.token().is_none() {
        warn!("no GitHub token found, relying on git credential helpers and gh login state");
    }

    let github = GhClient::new(
        settings.github.program.clone(),
        auth.token().map(String::from),
    );
    let session = SyncSession::new(&settings, auth, &github);
    session.run(&opts.repo, opts.pr)?;

    Ok(())
}

async fn run_mirror(config: &Path, opts: MirrorOptions) -> Result<()> {
    let settings = load_settings(config)?;
    let auth = RemoteAuth::resolve(opts.token);

    let source_url = opts
        .source_url
        .or_else(|| settings.mirror.source_url.clone())
        .ok_or_else(|| {
            anyhow!("no source repository URL configured, pass --source-url or set mirror.source_url")
        })?;
    let target_url = opts
        .target_url
        .or_else(|| settings.mirror.target_url.clone())
        .or_else(|| settings.child_remote_url())
        .ok_or_else(|| {
            anyhow!("no target repository URL configured, pass --target-url or set mirror.target_url")
        })?;
    let manifest_path = opts
        .manifest
        .unwrap_or_else(|| PathBuf::from(&settings.sync.manifest));

    let manifest = SyncManifest::load(&manifest_path)?;
    if manifest.is_empty() {
        warn!("sync manifest {:?} maps no files", manifest_path.display());
    }

    run_full_mirror(&settings, auth, &source_url, &target_url, &manifest).await?;

    Ok(())
}

fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        debug!("no settings file at {:?}, using defaults", path.display());
        return Ok(Settings::default());
    }

    Ok(Settings::load(path)?)
}
