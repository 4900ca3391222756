// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use h2diff::{
    apply_template_diff, path::default_session_config_path, sync::watch::NotifyBackend,
    DiffSession, MonorepoTemplate, SessionConfig,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  h2diff [options] <h2diff-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        match self.command {
            Command::Merge(opts) => run_merge(opts).await,
            Command::Session(opts) => run_session(opts).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Apply diff over starter template into output directory once.
    #[command(override_usage = "h2diff merge [options] <diff> <output>")]
    Merge(MergeOptions),

    /// Work on diff inside of temporary merged project until interrupted.
    #[command(override_usage = "h2diff session [options] <diff>")]
    Session(SessionOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct MergeOptions {
    /// Path to diff project.
    #[arg(required = true, value_name = "diff")]
    pub diff: PathBuf,

    /// Path to write merged project into.
    #[arg(required = true, value_name = "output")]
    pub output: PathBuf,

    /// Path to starter template.
    #[arg(short, long, value_name = "path")]
    pub template: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SessionOptions {
    /// Path to diff project.
    #[arg(required = true, value_name = "diff")]
    pub diff: PathBuf,

    /// Path to starter template.
    #[arg(short, long, value_name = "path")]
    pub template: Option<PathBuf>,

    /// Path to shared dependency directory to link into merged project.
    #[arg(short, long, value_name = "path")]
    pub dependency_store: Option<PathBuf>,

    /// Keep merged project synchronized with diff and template.
    #[arg(short, long)]
    pub watch: bool,

    /// Path to session configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Pull storefront configuration back into diff before exiting.
    #[arg(long)]
    pub keep_config: bool,

    /// Pull build output back into diff before exiting.
    #[arg(long)]
    pub keep_build: bool,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
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

fn locator_for(diff: &std::path::Path, config: &SessionConfig) -> MonorepoTemplate {
    let locator = MonorepoTemplate::new(diff);
    match &config.template {
        Some(template) => locator.with_fallback(template),
        None => locator,
    }
}

async fn run_merge(opts: MergeOptions) -> Result<()> {
    let diff = tokio::fs::canonicalize(&opts.diff)
        .await
        .with_context(|| format!("cannot resolve diff {:?}", opts.diff.display()))?;
    let locator = locator_for(&diff, &SessionConfig::default());

    tokio::fs::create_dir_all(&opts.output).await?;
    apply_template_diff(&opts.output, &diff, opts.template, &locator).await?;
    info!("merged project written to {:?}", opts.output.display());

    Ok(())
}

async fn run_session(opts: SessionOptions) -> Result<()> {
    let config_path = match opts.config {
        Some(path) => path,
        None => default_session_config_path()?,
    };
    let mut config = SessionConfig::load(&config_path).await?;
    if opts.template.is_some() {
        config.template = opts.template;
    }
    if opts.dependency_store.is_some() {
        config.dependency_store = opts.dependency_store;
    }
    config.watch |= opts.watch;

    let diff = tokio::fs::canonicalize(&opts.diff)
        .await
        .with_context(|| format!("cannot resolve diff {:?}", opts.diff.display()))?;
    let locator = locator_for(&diff, &config);
    let mut session = DiffSession::prepare(&diff, &config, &locator, NotifyBackend::new()).await?;
    info!("merged project ready at {:?}", session.target().display());

    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for interrupt: {error}");
    }

    // INVARIANT: Always clean up, even if pulling results back fails.
    let pulled = pull_back(&session, opts.keep_config, opts.keep_build).await;
    let diagnostics = session.diagnostics();
    session.cleanup().await?;
    if let Some(diagnostics) = diagnostics {
        info!(
            "live sync performed {} actions with {} failures",
            diagnostics.actions(),
            diagnostics.failures()
        );
    }

    pulled
}

async fn pull_back(session: &DiffSession, keep_config: bool, keep_build: bool) -> Result<()> {
    if keep_config {
        session.copy_shopify_config().await?;
    }

    if keep_build {
        session.copy_diff_build().await?;
    }

    Ok(())
}
