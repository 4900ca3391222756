// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Live synchronization between target, diff, and template.
//!
//! Once a diff has been applied, the merged __target__ project has to follow
//! whatever the developer edits in the __diff__ project or the starter
//! __template__, while type declarations generated inside of the target have
//! to flow back into the diff.
//!
//! # Watches
//!
//! The [`SyncController`] owns up to three watches, one per directory. Each
//! watch is either on or off. A watch that cannot be established is logged
//! and left off, which only disables that part of live synchronization. Once
//! on, a watch stays on until [`SyncController::stop`] is called. A stopped
//! controller cannot be started again.
//!
//! # Event Handling
//!
//! Every event is resolved against the routing table in [`route`], and the
//! routed action is performed on the single relative path of the event.
//! Events of one batch are handled concurrently, and the three watches run
//! independently of each other. Each action only touches its own path, so
//! the order in which events are handled does not matter.
//!
//! Failures of individual actions are never fatal. They are logged and
//! counted in [`SyncDiagnostics`]. Errors reported by the watch backend
//! itself drop the batch, but the watch keeps running.
//!
//! # Diff Priority
//!
//! A template change is only propagated when the diff does not provide the
//! same path. The diff is checked right before the template file is copied,
//! so a diff file created at the same moment keeps priority as long as its
//! own event is handled afterwards. Deleting a template file the diff also
//! provides puts the diff's copy back into the target.
//!
//! Template files left out of the initial merge, e.g., the changelog or
//! anything in the diff's `skipFiles`, are never brought back by live
//! synchronization either.

pub mod route;
pub mod watch;

use crate::{
    config::DiffOptions,
    copy::{copy_dir, copy_file, exists, remove_path, CopyOptions, PathFilter},
    path::{rebase, relative_to},
    sync::{
        route::{route, EventKind, Side, SyncAction},
        watch::{EventBatch, NotifyBackend, Subscription, WatchBackend, WatchError},
    },
    template::{template_filter, BUILD_DIRS},
};

use futures::future::join_all;
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, instrument, warn};

/// Root directories of a diff session.
///
/// Also remembers which template paths were left out of the merged project,
/// so live synchronization never brings them back.
#[derive(Debug, Clone)]
pub struct SyncRoots {
    pub target: PathBuf,
    pub diff: PathBuf,
    pub template: PathBuf,
    template_filter: PathFilter,
}

impl SyncRoots {
    /// Construct new set of roots.
    pub fn new(
        target: impl Into<PathBuf>,
        diff: impl Into<PathBuf>,
        template: impl Into<PathBuf>,
    ) -> Self {
        let template = template.into();
        Self {
            target: target.into(),
            diff: diff.into(),
            template_filter: template_filter(&template, &DiffOptions::default()),
            template,
        }
    }

    /// Leave out template files the diff asked to skip.
    pub fn with_diff_options(mut self, options: &DiffOptions) -> Self {
        self.template_filter = template_filter(&self.template, options);
        self
    }

    /// Check if relative path of side may be copied into target.
    ///
    /// Template paths excluded from the initial merge stay excluded.
    pub fn provides(&self, side: Side, relative: impl AsRef<Path>) -> bool {
        side != Side::Template || !self.template_filter.excludes(relative)
    }

    fn filter_for(&self, side: Side, from: &Path) -> PathFilter {
        match side {
            Side::Template => self.template_filter.clone(),
            _ => PathFilter::new(from).with_excluded_names(BUILD_DIRS),
        }
    }

    /// Root directory of side.
    pub fn root(&self, side: Side) -> &Path {
        match side {
            Side::Target => self.target.as_path(),
            Side::Diff => self.diff.as_path(),
            Side::Template => self.template.as_path(),
        }
    }
}

/// Counters describing what live synchronization has done so far.
#[derive(Debug, Default)]
pub struct SyncDiagnostics {
    actions: AtomicUsize,
    failures: AtomicUsize,
    backend_errors: AtomicUsize,
}

impl SyncDiagnostics {
    /// Number of routed actions that completed.
    pub fn actions(&self) -> usize {
        self.actions.load(Ordering::SeqCst)
    }

    /// Number of routed actions that failed.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Number of batches dropped because watch backend reported an error.
    pub fn backend_errors(&self) -> usize {
        self.backend_errors.load(Ordering::SeqCst)
    }
}

/// Handle single event on relative path of source side.
///
/// Returns routed action, or [`None`] if event was ignored. Failures are
/// logged and counted, never returned.
pub async fn handle_event(
    roots: &SyncRoots,
    diagnostics: &SyncDiagnostics,
    source: Side,
    relative: &Path,
    kind: EventKind,
) -> Option<SyncAction> {
    let action = route(source, kind, relative)?;
    debug!("{source} {kind:?} {:?} routes to {action:?}", relative.display());

    match perform(roots, action, relative).await {
        Ok(()) => {
            diagnostics.actions.fetch_add(1, Ordering::SeqCst);
        }
        Err(error) => {
            diagnostics.failures.fetch_add(1, Ordering::SeqCst);
            warn!("sync of {:?} from {source} failed: {error}", relative.display());
        }
    }

    Some(action)
}

/// Handle batch of events delivered by watch on source side.
///
/// Event paths are resolved against `watch_root` first, then against the
/// side's root in `roots`. Events outside of both are ignored.
pub async fn handle_batch(
    roots: &SyncRoots,
    diagnostics: &SyncDiagnostics,
    source: Side,
    watch_root: &Path,
    batch: EventBatch,
) {
    let events = match batch {
        Ok(events) => events,
        Err(error) => {
            diagnostics.backend_errors.fetch_add(1, Ordering::SeqCst);
            error!("{source} watch reported error: {error}");
            return;
        }
    };

    let handlers = events.into_iter().filter_map(|event| {
        let relative = relative_to(watch_root, &event.path)
            .or_else(|| relative_to(roots.root(source), &event.path))?;
        Some(async move {
            handle_event(roots, diagnostics, source, &relative, event.kind).await;
        })
    });

    join_all(handlers).await;
}

async fn perform(roots: &SyncRoots, action: SyncAction, relative: &Path) -> Result<()> {
    let at = |side: Side| {
        rebase(roots.root(side), relative).ok_or_else(|| SyncError::Escape {
            path: relative.to_path_buf(),
        })
    };

    match action {
        SyncAction::Copy { from, to } => {
            if !roots.provides(from, relative) {
                debug!("{:?} excluded from {from}, skipping", relative.display());
                return Ok(());
            }
            mirror(roots, from, &at(from)?, &at(to)?).await
        }
        SyncAction::CopyUnlessShadowed { from, to, shadow } => {
            if !roots.provides(from, relative) {
                debug!("{:?} excluded from {from}, skipping", relative.display());
                return Ok(());
            }

            // INVARIANT: Check shadow right before the write, never earlier.
            if exists(at(shadow)?).await {
                debug!("{:?} shadowed by {shadow}, skipping", relative.display());
                return Ok(());
            }
            mirror(roots, from, &at(from)?, &at(to)?).await
        }
        SyncAction::RestoreOrDelete { fallback, to } => {
            let fallback_path = at(fallback)?;
            if roots.provides(fallback, relative) && exists(&fallback_path).await {
                mirror(roots, fallback, &fallback_path, &at(to)?).await
            } else {
                Ok(remove_path(at(to)?).await?)
            }
        }
    }
}

/// Copy file or directory tree from one side to another.
async fn mirror(roots: &SyncRoots, side: Side, from: &Path, to: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(from)
        .await
        .map_err(|source| SyncError::Source {
            source,
            path: from.to_path_buf(),
        })?;

    if metadata.is_dir() {
        let filter = roots.filter_for(side, from);
        copy_dir(from, to, CopyOptions::new().filter(filter)).await?;
    } else {
        copy_file(from, to).await?;
    }

    Ok(())
}

struct ActiveWatch {
    side: Side,
    subscription: Box<dyn Subscription>,
    task: JoinHandle<()>,
}

/// Keep target, diff, and template synchronized.
pub struct SyncController {
    roots: Arc<SyncRoots>,
    diagnostics: Arc<SyncDiagnostics>,
    backend: Box<dyn WatchBackend>,
    watches: Vec<ActiveWatch>,
    stopped: bool,
}

impl SyncController {
    /// Construct new controller with every watch off.
    pub fn new(roots: SyncRoots, backend: impl WatchBackend + 'static) -> Self {
        Self {
            roots: Arc::new(roots),
            diagnostics: Arc::new(SyncDiagnostics::default()),
            backend: Box::new(backend),
            watches: Vec::new(),
            stopped: false,
        }
    }

    /// Construct new controller using `notify` backend.
    pub fn with_notify(roots: SyncRoots) -> Self {
        Self::new(roots, NotifyBackend::new())
    }

    /// Roots being synchronized.
    pub fn roots(&self) -> &SyncRoots {
        &self.roots
    }

    /// Shared diagnostic counters.
    pub fn diagnostics(&self) -> Arc<SyncDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Sides whose watch is on.
    pub fn active_watches(&self) -> Vec<Side> {
        self.watches.iter().map(|watch| watch.side).collect()
    }

    /// Turn on every watch that is still off.
    ///
    /// Watches that cannot be established are logged and left off. Returns
    /// sides whose watch is on afterwards.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Stopped`] if controller was already stopped.
    #[instrument(skip(self), level = "debug")]
    pub async fn start(&mut self) -> Result<Vec<Side>> {
        if self.stopped {
            return Err(SyncError::Stopped);
        }

        for side in Side::ALL {
            if self.watches.iter().any(|watch| watch.side == side) {
                continue;
            }

            match self.subscribe(side).await {
                Ok(watch) => {
                    info!("watching {side} at {:?}", self.roots.root(side).display());
                    self.watches.push(watch);
                }
                Err(error) => {
                    warn!("live sync from {side} disabled: {error}");
                }
            }
        }

        Ok(self.active_watches())
    }

    async fn subscribe(&self, side: Side) -> Result<ActiveWatch> {
        let root = self.roots.root(side);
        let watch_root = tokio::fs::canonicalize(root)
            .await
            .unwrap_or_else(|_| root.to_path_buf());

        let (sink, mut events) = mpsc::unbounded_channel();
        let subscription = self.backend.subscribe(&watch_root, &BUILD_DIRS, sink)?;

        let roots = Arc::clone(&self.roots);
        let diagnostics = Arc::clone(&self.diagnostics);
        let task = tokio::spawn(async move {
            while let Some(batch) = events.recv().await {
                handle_batch(&roots, &diagnostics, side, &watch_root, batch).await;
            }
        });

        Ok(ActiveWatch {
            side,
            subscription,
            task,
        })
    }

    /// Turn off every watch.
    ///
    /// All watches are unsubscribed concurrently. A failure to unsubscribe
    /// one watch does not keep the others from being unsubscribed. Calling
    /// this more than once is harmless. Returns unsubscribe failures.
    #[instrument(skip(self), level = "debug")]
    pub async fn stop(&mut self) -> Vec<(Side, WatchError)> {
        self.stopped = true;
        let watches = std::mem::take(&mut self.watches);

        let results = join_all(watches.into_iter().map(|watch| async move {
            let result = watch.subscription.unsubscribe().await;
            watch.task.abort();
            (watch.side, result)
        }))
        .await;

        let mut failures = Vec::new();
        for (side, result) in results {
            match result {
                Ok(()) => debug!("stopped watching {side}"),
                Err(error) => {
                    warn!("failed to stop watching {side}: {error}");
                    failures.push((side, error));
                }
            }
        }

        failures
    }
}

/// Live synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Controller was already stopped.
    #[error("live sync was stopped and cannot be restarted")]
    Stopped,

    /// Watch cannot be established.
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Relative event path escapes its root.
    #[error("event path {:?} escapes sync roots", path.display())]
    Escape { path: PathBuf },

    /// Source of copy cannot be inspected.
    #[error("cannot read sync source {:?}", path.display())]
    Source {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Copy or removal fails.
    #[error(transparent)]
    Copy(#[from] crate::copy::CopyError),
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
