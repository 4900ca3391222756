// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Diff session lifecycle.
//!
//! A [`DiffSession`] owns the temporary merged project produced from a diff
//! and its starter template. Preparing a session creates a fresh directory
//! that never existed before, applies the diff into it, links the shared
//! dependency store, and optionally turns on live synchronization.
//!
//! The merged project is thrown away by [`DiffSession::cleanup`]. Before that,
//! results produced inside of it can be pulled back into the diff through
//! [`DiffSession::copy_shopify_config`] and [`DiffSession::copy_diff_build`].

use crate::{
    config::{DiffOptions, SessionConfig},
    copy::{copy_dir, copy_file, exists, remove_path, symlink_dir, CopyError, CopyOptions},
    sync::{route::Side, watch::WatchBackend, SyncController, SyncDiagnostics, SyncRoots},
    template::{apply_template_diff, TemplateLocator, SHOPIFY_CONFIG_DIR},
};

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Prefix of temporary merged project directories.
pub const TARGET_PREFIX: &str = "h2diff-";

/// Dependency directory linked into merged project.
pub const DEPENDENCY_DIR: &str = "node_modules";

/// Build output directory pulled back into diff.
pub const BUILD_OUTPUT_DIR: &str = "dist";

/// Environment file pulled back into diff alongside build output.
pub const ENV_FILE: &str = ".env";

/// Temporary merged project of a diff and its starter template.
pub struct DiffSession {
    target: PathBuf,
    diff: PathBuf,
    template: PathBuf,
    options: DiffOptions,
    sync: Option<SyncController>,
    cleaned: bool,
}

impl DiffSession {
    /// Prepare new diff session.
    ///
    /// Merged project is created under the system's temporary directory. If
    /// applying the diff fails, the half-built project is removed before the
    /// error is returned.
    ///
    /// Live synchronization failing to start only degrades the session, it
    /// never fails preparation.
    ///
    /// # Errors
    ///
    /// - Return [`SessionError::CreateTarget`] if merged project directory
    ///   cannot be created.
    /// - Return [`SessionError::Apply`] if template cannot be located, or
    ///   diff cannot be applied.
    /// - Return [`SessionError::Copy`] if dependency store cannot be linked.
    #[instrument(skip(diff, config, locator, backend), level = "debug")]
    pub async fn prepare(
        diff: impl AsRef<Path>,
        config: &SessionConfig,
        locator: &dyn TemplateLocator,
        backend: impl WatchBackend + 'static,
    ) -> Result<Self> {
        let target = std::env::temp_dir().join(format!("{TARGET_PREFIX}{}", Uuid::new_v4()));
        Self::prepare_in(target, diff, config, locator, backend).await
    }

    /// Prepare new diff session with merged project at `target`.
    ///
    /// # Errors
    ///
    /// - Return [`SessionError::CreateTarget`] if `target` already exists, or
    ///   cannot be created.
    /// - Return [`SessionError::Apply`] if template cannot be located, or
    ///   diff cannot be applied.
    /// - Return [`SessionError::Copy`] if dependency store cannot be linked.
    #[instrument(skip(target, diff, config, locator, backend), level = "debug")]
    pub async fn prepare_in(
        target: impl Into<PathBuf>,
        diff: impl AsRef<Path>,
        config: &SessionConfig,
        locator: &dyn TemplateLocator,
        backend: impl WatchBackend + 'static,
    ) -> Result<Self> {
        let target = target.into();
        let diff = diff.as_ref().to_path_buf();

        // INVARIANT: Merged project directory must be brand new.
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SessionError::CreateTarget {
                    source,
                    path: target.clone(),
                })?;
        }
        tokio::fs::create_dir(&target)
            .await
            .map_err(|source| SessionError::CreateTarget {
                source,
                path: target.clone(),
            })?;
        info!("prepare merged project at {:?}", target.display());

        let prepared = async {
            let template = match &config.template {
                Some(template) => template.clone(),
                None => locator.locate(config.prefer_monorepo_template).await?,
            };

            let options =
                apply_template_diff(&target, &diff, Some(template.clone()), locator).await?;
            if let Some(store) = &config.dependency_store {
                debug!("link dependency store {:?}", store.display());
                symlink_dir(store, target.join(DEPENDENCY_DIR)).await?;
            }

            Ok::<_, SessionError>((template, options))
        }
        .await;

        let (template, options) = match prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                discard(&target).await;
                return Err(error);
            }
        };

        let mut session = Self {
            target,
            diff,
            template,
            options,
            sync: None,
            cleaned: false,
        };

        if config.watch {
            session.start_sync(backend).await;
        }

        Ok(session)
    }

    async fn start_sync(&mut self, backend: impl WatchBackend + 'static) {
        let roots = SyncRoots::new(&self.target, &self.diff, &self.template)
            .with_diff_options(&self.options);
        let mut sync = SyncController::new(roots, backend);
        match sync.start().await {
            Ok(active) if active.is_empty() => warn!("live sync unavailable"),
            Ok(active) => info!("live sync running for {} directories", active.len()),
            Err(error) => warn!("live sync unavailable: {error}"),
        }
        self.sync = Some(sync);
    }

    /// Path to merged project.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Path to diff project.
    pub fn diff(&self) -> &Path {
        &self.diff
    }

    /// Path to starter template in use.
    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Diff options the merged project was built with.
    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Sides currently kept in sync.
    pub fn active_watches(&self) -> Vec<Side> {
        self.sync
            .as_ref()
            .map(SyncController::active_watches)
            .unwrap_or_default()
    }

    /// Live synchronization counters, if live synchronization was requested.
    pub fn diagnostics(&self) -> Option<Arc<SyncDiagnostics>> {
        self.sync.as_ref().map(SyncController::diagnostics)
    }

    /// Tear down session.
    ///
    /// Stops live synchronization, then removes merged project. Failing to
    /// stop a watch is logged, and never prevents removal. Calling this more
    /// than once is harmless.
    ///
    /// # Errors
    ///
    /// - Return [`SessionError::Copy`] if merged project cannot be removed.
    #[instrument(skip(self), level = "debug")]
    pub async fn cleanup(&mut self) -> Result<()> {
        if let Some(mut sync) = self.sync.take() {
            let failures = sync.stop().await;
            if !failures.is_empty() {
                warn!("{} watches did not stop cleanly", failures.len());
            }
        }

        if self.cleaned {
            return Ok(());
        }

        remove_path(&self.target).await?;
        self.cleaned = true;
        info!("removed merged project {:?}", self.target.display());

        Ok(())
    }

    /// Pull linked storefront configuration back into diff.
    ///
    /// Does nothing if merged project has no configuration.
    ///
    /// # Errors
    ///
    /// - Return [`SessionError::Copy`] if configuration cannot be copied.
    #[instrument(skip(self), level = "debug")]
    pub async fn copy_shopify_config(&self) -> Result<()> {
        let source = self.target.join(SHOPIFY_CONFIG_DIR);
        if !exists(&source).await {
            debug!("no storefront configuration to pull back");
            return Ok(());
        }

        let destination = self.diff.join(SHOPIFY_CONFIG_DIR);
        remove_path(&destination).await?;
        copy_dir(&source, &destination, CopyOptions::new()).await?;
        info!("pulled storefront configuration into {:?}", self.diff.display());

        Ok(())
    }

    /// Pull build output and environment file back into diff.
    ///
    /// Any previous build output in diff is replaced. Missing build output or
    /// environment file is skipped.
    ///
    /// # Errors
    ///
    /// - Return [`SessionError::Copy`] if build output cannot be copied.
    #[instrument(skip(self), level = "debug")]
    pub async fn copy_diff_build(&self) -> Result<()> {
        let destination = self.diff.join(BUILD_OUTPUT_DIR);
        remove_path(&destination).await?;

        let build = self.target.join(BUILD_OUTPUT_DIR);
        let copy_build = async {
            if exists(&build).await {
                copy_dir(&build, &destination, CopyOptions::new()).await?;
            } else {
                warn!("no build output in {:?}", self.target.display());
            }
            Ok::<_, CopyError>(())
        };

        let env = self.target.join(ENV_FILE);
        let copy_env = async {
            if exists(&env).await {
                copy_file(&env, self.diff.join(ENV_FILE)).await?;
            }
            Ok::<_, CopyError>(())
        };

        tokio::try_join!(copy_build, copy_env)?;
        info!("pulled build output into {:?}", self.diff.display());

        Ok(())
    }
}

/// Best effort removal of half-built merged project.
async fn discard(target: &Path) {
    if let Err(error) = remove_path(target).await {
        warn!("failed to discard {:?}: {error}", target.display());
    }
}

/// Diff session error types.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Merged project directory cannot be created.
    #[error("cannot create merged project at {:?}", path.display())]
    CreateTarget {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Diff cannot be applied.
    #[error(transparent)]
    Apply(#[from] crate::template::ApplyError),

    /// Files cannot be copied, linked, or removed.
    #[error(transparent)]
    Copy(#[from] CopyError),
}

/// Friendly result alias :3
pub type Result<T, E = SessionError> = std::result::Result<T, E>;
