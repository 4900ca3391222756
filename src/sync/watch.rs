// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filesystem watch backends.
//!
//! A [`WatchBackend`] subscribes to recursive change notifications for one
//! directory, and delivers them as batches of [`WatchEvent`]s through a
//! channel. The subscription lives until it is explicitly unsubscribed.
//!
//! The default backend is built on `notify`. It uses the native watcher of
//! the platform, and falls back to polling for filesystems where native
//! watching does not work, e.g., network mounts.
//!
//! Symbolic links are never followed, so a dependency store linked into the
//! merged project is not watched. Events under any path component named in
//! the ignore list are dropped before they reach the sink.

use crate::sync::route::EventKind;

use futures::future::BoxFuture;
use notify::{
    event::{EventKind as NotifyKind, ModifyKind},
    Config, Event, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::{
    path::{Component, Path, PathBuf},
    time::Duration,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, instrument, warn};

/// Interval used by polling fallback.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Single change reported by watch backend.
///
/// Path is absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: EventKind,
}

impl WatchEvent {
    /// Construct new watch event.
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Batch of events, or an error reported by watch backend itself.
pub type EventBatch = Result<Vec<WatchEvent>>;

/// Source of filesystem change notifications.
pub trait WatchBackend: Send + Sync {
    /// Subscribe to changes under `root`, delivering batches to `sink`.
    ///
    /// Events under a path component matching one of `ignored` (ignoring
    /// case) are not delivered.
    ///
    /// # Errors
    ///
    /// - Return [`WatchError`] if subscription cannot be established.
    fn subscribe(
        &self,
        root: &Path,
        ignored: &[&str],
        sink: UnboundedSender<EventBatch>,
    ) -> Result<Box<dyn Subscription>>;
}

/// Active watch subscription.
pub trait Subscription: Send {
    /// Stop delivering events and release watch resources.
    fn unsubscribe(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Watch backend built on `notify`.
#[derive(Debug, Default, Clone)]
pub struct NotifyBackend;

impl NotifyBackend {
    /// Construct new notify backend.
    pub fn new() -> Self {
        Self
    }
}

impl WatchBackend for NotifyBackend {
    #[instrument(skip(self, root, ignored, sink), level = "debug")]
    fn subscribe(
        &self,
        root: &Path,
        ignored: &[&str],
        sink: UnboundedSender<EventBatch>,
    ) -> Result<Box<dyn Subscription>> {
        let filter = EventFilter::new(root, ignored);

        let native_sink = sink.clone();
        let native_filter = filter.clone();
        let native = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = native_sink.send(native_filter.batch(res));
            },
            Config::default().with_follow_symlinks(false),
        )
        .and_then(|mut watcher| {
            watcher.watch(root, RecursiveMode::Recursive)?;
            Ok(watcher)
        });

        let watcher: Box<dyn Watcher + Send> = match native {
            Ok(watcher) => {
                debug!("native watch on {:?}", root.display());
                Box::new(watcher)
            }
            Err(error) => {
                warn!(
                    "native watch failed on {:?}: {error}, falling back to polling",
                    root.display()
                );
                let mut watcher = PollWatcher::new(
                    move |res: notify::Result<Event>| {
                        let _ = sink.send(filter.batch(res));
                    },
                    Config::default()
                        .with_poll_interval(POLL_INTERVAL)
                        .with_follow_symlinks(false),
                )
                .map_err(|source| WatchError::Subscribe {
                    source,
                    path: root.to_path_buf(),
                })?;
                watcher
                    .watch(root, RecursiveMode::Recursive)
                    .map_err(|source| WatchError::Subscribe {
                        source,
                        path: root.to_path_buf(),
                    })?;
                Box::new(watcher)
            }
        };

        Ok(Box::new(NotifySubscription {
            watcher,
            root: root.to_path_buf(),
        }))
    }
}

struct NotifySubscription {
    watcher: Box<dyn Watcher + Send>,
    root: PathBuf,
}

impl Subscription for NotifySubscription {
    fn unsubscribe(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            let NotifySubscription { mut watcher, root } = *self;
            tokio::task::spawn_blocking(move || {
                watcher
                    .unwatch(&root)
                    .map_err(|source| WatchError::Unsubscribe { source, path: root })
            })
            .await
            .unwrap_or_else(|err| Err(WatchError::Join(err)))
        })
    }
}

/// Turn raw backend events into batches, dropping ignored paths.
#[derive(Debug, Clone)]
struct EventFilter {
    root: PathBuf,
    ignored: Vec<String>,
}

impl EventFilter {
    fn new(root: &Path, ignored: &[&str]) -> Self {
        Self {
            root: root.to_path_buf(),
            ignored: ignored.iter().map(|name| name.to_string()).collect(),
        }
    }

    fn batch(&self, res: notify::Result<Event>) -> EventBatch {
        let event = res.map_err(WatchError::Backend)?;
        Ok(event
            .paths
            .iter()
            .filter(|path| !self.ignores(path))
            .filter_map(|path| classify(&event.kind, path).map(|kind| WatchEvent::new(path, kind)))
            .collect())
    }

    /// Check if path lies under an ignored component below root.
    ///
    /// Paths outside of root are never ignored.
    fn ignores(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };

        relative.components().any(|component| match component {
            Component::Normal(part) => {
                let part = part.to_string_lossy();
                self.ignored.iter().any(|name| name.eq_ignore_ascii_case(&part))
            }
            _ => false,
        })
    }
}

/// Reduce backend event kind to create, update, or delete.
///
/// Renames are resolved by checking whether path still exists. Access and
/// metadata-only changes are dropped.
fn classify(kind: &NotifyKind, path: &Path) -> Option<EventKind> {
    match kind {
        NotifyKind::Create(_) => Some(EventKind::Create),
        NotifyKind::Remove(_) => Some(EventKind::Delete),
        NotifyKind::Modify(ModifyKind::Name(_)) if path.exists() => Some(EventKind::Create),
        NotifyKind::Modify(ModifyKind::Name(_)) => Some(EventKind::Delete),
        NotifyKind::Modify(ModifyKind::Metadata(_)) => None,
        NotifyKind::Modify(_) => Some(EventKind::Update),
        NotifyKind::Any => Some(EventKind::Update),
        NotifyKind::Access(_) | NotifyKind::Other => None,
    }
}

/// Watch backend error types.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Subscription cannot be established.
    #[error("failed to watch {:?}", path.display())]
    Subscribe {
        #[source]
        source: notify::Error,
        path: PathBuf,
    },

    /// Subscription cannot be released.
    #[error("failed to stop watching {:?}", path.display())]
    Unsubscribe {
        #[source]
        source: notify::Error,
        path: PathBuf,
    },

    /// Backend reported an error instead of events.
    #[error(transparent)]
    Backend(#[from] notify::Error),

    /// Blocking unsubscribe was cancelled or panicked.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// Friendly result alias :3
pub type Result<T, E = WatchError> = std::result::Result<T, E>;
