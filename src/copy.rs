// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filtered directory copying.
//!
//! Utilities to copy directory trees between the template, diff, and merged
//! project directories while leaving out paths that must never travel between
//! them, e.g., build output, dependency directories, caches, etc.
//!
//! # Path Filters
//!
//! A [`PathFilter`] decides whether a path is excluded from a copy. Paths are
//! evaluated relative to a __reference root__, which is usually the source
//! directory of the copy, but does not have to be. A path is excluded if its
//! relative form matches the filter's pattern, or if it appears verbatim in
//! the filter's skip list.
//!
//! Excluded directories are never descended into, so large trees like
//! `node_modules` cost nothing to skip.

use crate::path::{relative_to, to_slash};

use futures::stream::{self, StreamExt, TryStreamExt};
use ignore::{DirEntry, WalkBuilder};
use regex::{Regex, RegexBuilder};
use std::{
    collections::HashSet,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Maximum number of file copies in flight at once.
const COPY_CONCURRENCY: usize = 32;

/// Decide which paths a copy leaves out.
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    pattern: Option<Regex>,
    skip: HashSet<String>,
}

impl PathFilter {
    /// Construct new filter that excludes nothing.
    ///
    /// Paths are evaluated relative to `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pattern: None,
            skip: HashSet::new(),
        }
    }

    /// Exclude any path with a component equal to one of `names`.
    ///
    /// Comparison ignores case. An excluded directory excludes everything
    /// beneath it.
    pub fn with_excluded_names(mut self, names: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let alternatives = names
            .into_iter()
            .map(|name| regex::escape(name.as_ref()))
            .collect::<Vec<_>>();
        if alternatives.is_empty() {
            return self;
        }

        // INVARIANT: Escaped literals cannot produce an invalid pattern.
        let pattern = RegexBuilder::new(&format!("(^|/)({})(/|$)", alternatives.join("|")))
            .case_insensitive(true)
            .build()
            .expect("escaped literals form a valid pattern");
        self.pattern = Some(pattern);
        self
    }

    /// Exclude exact relative paths, e.g., `app/routes/_index.tsx`.
    pub fn with_skip_files(mut self, files: impl IntoIterator<Item = impl AsRef<Path>>) -> Self {
        self.skip
            .extend(files.into_iter().map(|file| to_slash(file.as_ref())));
        self
    }

    /// Reference root that paths are evaluated against.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Check if relative path is excluded.
    pub fn excludes(&self, relative: impl AsRef<Path>) -> bool {
        let relative = to_slash(relative);
        if self.skip.contains(&relative) {
            return true;
        }

        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&relative))
    }

    /// Check if absolute path is excluded.
    ///
    /// Paths outside of the reference root are evaluated relative to
    /// `fallback_root` instead.
    pub fn excludes_path(&self, path: impl AsRef<Path>, fallback_root: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match relative_to(&self.root, path).or_else(|| relative_to(fallback_root, path)) {
            Some(relative) => self.excludes(relative),
            None => false,
        }
    }
}

/// Options for [`copy_dir`].
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Replace files that already exist at destination.
    pub overwrite: bool,

    /// Paths to leave out of copy.
    pub filter: Option<PathFilter>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            filter: None,
        }
    }
}

impl CopyOptions {
    /// Copy everything, overwriting existing files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave out paths excluded by filter.
    pub fn filter(mut self, filter: PathFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set whether existing destination files are replaced.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Recursively copy every file under `source` into `destination`.
///
/// Relative paths are preserved. Returns relative paths of copied files.
///
/// # Errors
///
/// - Return [`CopyError::Walk`] if source tree cannot be traversed.
/// - Return [`CopyError::Io`] if any file cannot be copied.
#[instrument(skip(source, destination, options), level = "debug")]
pub async fn copy_dir(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: CopyOptions,
) -> Result<Vec<PathBuf>> {
    let source = source.as_ref().to_path_buf();
    let destination = destination.as_ref().to_path_buf();
    debug!("copy {:?} to {:?}", source.display(), destination.display());

    let files = list_files(source.clone(), options.filter.clone()).await?;
    let overwrite = options.overwrite;

    let copied = stream::iter(files)
        .map(|relative| {
            let from = source.join(&relative);
            let to = destination.join(&relative);
            async move {
                let copied = copy_one(&from, &to, overwrite).await?;
                Ok::<_, CopyError>(copied.then_some(relative))
            }
        })
        .buffer_unordered(COPY_CONCURRENCY)
        .try_collect::<Vec<_>>()
        .await?;

    let mut copied = copied.into_iter().flatten().collect::<Vec<_>>();
    copied.sort();

    Ok(copied)
}

async fn copy_one(source: &Path, destination: &Path, overwrite: bool) -> Result<bool> {
    if !overwrite && exists(destination).await {
        return Ok(false);
    }

    copy_file(source, destination).await?;
    Ok(true)
}

/// Copy a single file, creating missing parent directories.
///
/// # Errors
///
/// - Return [`CopyError::Io`] if parent directories cannot be created, or
///   file cannot be copied.
pub async fn copy_file(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<()> {
    let (source, destination) = (source.as_ref(), destination.as_ref());
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| CopyError::Io {
                source: err,
                path: parent.to_path_buf(),
            })?;
    }

    tokio::fs::copy(source, destination)
        .await
        .map_err(|err| CopyError::Io {
            source: err,
            path: source.to_path_buf(),
        })?;

    Ok(())
}

/// Remove a file, symbolic link, or directory tree.
///
/// Removing a path that does not exist is not an error.
///
/// # Errors
///
/// - Return [`CopyError::Io`] if path exists but cannot be removed.
pub async fn remove_path(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(CopyError::Io {
                source: err,
                path: path.to_path_buf(),
            })
        }
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(CopyError::Io {
            source: err,
            path: path.to_path_buf(),
        }),
    }
}

/// Check if path exists.
///
/// Unreadable paths are treated as missing.
pub async fn exists(path: impl AsRef<Path>) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Link `original` directory at `link`.
///
/// # Errors
///
/// - Return [`CopyError::Io`] if link cannot be created.
pub async fn symlink_dir(original: impl AsRef<Path>, link: impl AsRef<Path>) -> Result<()> {
    let (original, link) = (original.as_ref(), link.as_ref());

    #[cfg(unix)]
    let result = tokio::fs::symlink(original, link).await;
    #[cfg(windows)]
    let result = tokio::fs::symlink_dir(original, link).await;

    result.map_err(|err| CopyError::Io {
        source: err,
        path: link.to_path_buf(),
    })
}

/// Walk source tree and list relative paths of files to copy.
///
/// Walking is blocking, so it runs off of the async runtime.
async fn list_files(source: PathBuf, filter: Option<PathFilter>) -> Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
        let mut builder = WalkBuilder::new(&source);

        // INVARIANT: Copy everything the filter keeps, including hidden and
        // ignored files.
        builder.standard_filters(false).follow_links(false);

        if let Some(filter) = filter {
            let root = source.clone();
            builder.filter_entry(move |entry: &DirEntry| {
                entry.depth() == 0 || !filter.excludes_path(entry.path(), &root)
            });
        }

        let mut files = Vec::new();
        for entry in builder.build() {
            let entry = entry?;
            let is_dir = entry.file_type().is_some_and(|kind| kind.is_dir());
            if is_dir {
                continue;
            }

            if let Some(relative) = relative_to(&source, entry.path()) {
                files.push(relative);
            }
        }

        Ok(files)
    })
    .await?
}

/// Copy error types.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    /// Directory tree cannot be traversed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// Filesystem operation on path fails.
    #[error("filesystem operation failed at {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Blocking directory walk was cancelled or panicked.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// Friendly result alias :3
pub type Result<T, E = CopyError> = std::result::Result<T, E>;
