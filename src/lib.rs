// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Work on a template diff as if it were a complete project.
//!
//! A Hydrogen __diff__ only holds the files that differ from a __starter
//! template__. h2diff materializes a temporary __merged project__ out of the
//! two, where the diff always wins, and keeps that project synchronized while
//! the developer edits the diff or the template.
//!
//! # Usage
//!
//! 1. [`DiffSession::prepare`] applies the diff into a fresh temporary
//!    directory through [`apply_template_diff`], and optionally starts a
//!    [`SyncController`].
//! 2. Work happens inside of [`DiffSession::target`].
//! 3. [`DiffSession::copy_shopify_config`] and [`DiffSession::copy_diff_build`]
//!    pull results back into the diff.
//! 4. [`DiffSession::cleanup`] stops live sync and removes the merged project.

pub mod config;
pub mod copy;
pub mod manifest;
pub mod path;
pub mod session;
pub mod sync;
pub mod template;

pub use config::{DiffOptions, SessionConfig};
pub use session::DiffSession;
pub use sync::{SyncController, SyncDiagnostics, SyncRoots};
pub use template::{apply_template_diff, FixedTemplate, MonorepoTemplate, TemplateLocator};
