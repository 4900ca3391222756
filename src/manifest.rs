// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package manifest merging.
//!
//! A diff project and its starter template each carry a `package.json`
//! manifest. The merged project needs a single manifest where the diff's
//! dependencies and scripts take precedence over the template's.
//!
//! # Merge Rules
//!
//! Every top-level key of the source manifest is folded into the destination
//! manifest, except for ignored keys:
//!
//! - Two objects are merged one level deep, source entries win.
//! - Two arrays are concatenated, without repeating entries.
//! - Anything else is replaced by the source value.
//!
//! After the structural merge, an ordered list of [`ManifestRule`]s mutates
//! the result, dependency maps are sorted by package name, and the document is
//! written back to the destination. Nothing is written if either manifest
//! cannot be read or parsed.
//!
//! # See Also
//!
//! 1. [`rules`]

pub mod rules;

use crate::manifest::rules::ManifestRule;

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Manifest file name.
pub const MANIFEST_FILE: &str = "package.json";

/// Manifest sections mapping package names to version ranges.
pub const DEPENDENCY_SECTIONS: [&str; 3] = ["dependencies", "devDependencies", "peerDependencies"];

/// Read and parse manifest at target path.
///
/// # Errors
///
/// - Return [`ManifestError::Read`] if manifest cannot be read.
/// - Return [`ManifestError::Parse`] if manifest is not valid JSON.
/// - Return [`ManifestError::NotAnObject`] if manifest is not a JSON object.
pub async fn read_manifest(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ManifestError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

    let manifest: Value = serde_json::from_str(&data).map_err(|err| ManifestError::Parse {
        source: err,
        path: path.to_path_buf(),
    })?;

    if !manifest.is_object() {
        return Err(ManifestError::NotAnObject {
            path: path.to_path_buf(),
        });
    }

    Ok(manifest)
}

/// Serialize manifest to target path.
///
/// Uses two space indentation with a trailing newline.
///
/// # Errors
///
/// - Return [`ManifestError::Serialize`] if manifest cannot be serialized.
/// - Return [`ManifestError::Write`] if manifest cannot be written.
pub async fn write_manifest(path: impl AsRef<Path>, manifest: &Value) -> Result<()> {
    let path = path.as_ref();
    let mut data = serde_json::to_string_pretty(manifest).map_err(|err| ManifestError::Serialize {
        source: err,
        path: path.to_path_buf(),
    })?;
    data.push('\n');

    tokio::fs::write(path, data)
        .await
        .map_err(|err| ManifestError::Write {
            source: err,
            path: path.to_path_buf(),
        })
}

/// Fold `source` manifest into `target` manifest.
///
/// Keys in `ignored_keys` are never copied from `source`, and are removed from
/// `target` so they cannot leak into the result.
pub fn merge_documents(target: &mut Value, source: &Value, ignored_keys: &[&str]) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Some(target) = target.as_object_mut() else {
        return;
    };

    for key in ignored_keys {
        target.remove(*key);
    }

    let Some(source) = source.as_object() else {
        return;
    };

    for (key, source_value) in source {
        if ignored_keys.contains(&key.as_str()) {
            continue;
        }

        match (target.get_mut(key), source_value) {
            (Some(Value::Object(target_map)), Value::Object(source_map)) => {
                for (entry, value) in source_map {
                    target_map.insert(entry.clone(), value.clone());
                }
            }
            (Some(Value::Array(target_list)), Value::Array(source_list)) => {
                for value in source_list {
                    if !target_list.contains(value) {
                        target_list.push(value.clone());
                    }
                }
            }
            _ => {
                target.insert(key.clone(), source_value.clone());
            }
        }
    }
}

/// Sort every dependency section of manifest by package name.
pub fn sort_dependencies(manifest: &mut Value) {
    for section in DEPENDENCY_SECTIONS {
        if let Some(Value::Object(map)) = manifest.get_mut(section) {
            let mut entries = std::mem::take(map).into_iter().collect::<Vec<_>>();
            entries.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));
            *map = entries.into_iter().collect();
        }
    }
}

/// Options for [`merge_manifest`].
#[derive(Default)]
pub struct MergeOptions<'a> {
    /// Top-level keys that must never appear in the merged manifest.
    pub ignored_keys: Vec<&'a str>,

    /// Rules applied in order to the merged manifest before it is written.
    pub rules: Vec<Box<dyn ManifestRule>>,
}

/// Merge manifest at `source` path into manifest at `target` path.
///
/// Both manifests are read concurrently. The merged result is handed to each
/// rule in `options` in order, then written back to `target`.
///
/// # Errors
///
/// - Return [`ManifestError`] if either manifest cannot be read or parsed,
///   or if the result cannot be written. Target is left untouched unless
///   only the final write fails.
#[instrument(skip(target, source, options), level = "debug")]
pub async fn merge_manifest(
    target: impl AsRef<Path>,
    source: impl AsRef<Path>,
    options: MergeOptions<'_>,
) -> Result<Value> {
    let (target, source) = (target.as_ref(), source.as_ref());
    let (mut merged, incoming) = tokio::try_join!(read_manifest(target), read_manifest(source))?;

    merge_documents(&mut merged, &incoming, &options.ignored_keys);
    for rule in &options.rules {
        debug!("apply manifest rule {}", rule.name());
        rule.apply(&mut merged);
    }
    sort_dependencies(&mut merged);

    write_manifest(target, &merged).await?;

    Ok(merged)
}

/// Manifest error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest cannot be read.
    #[error("failed to read manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest is not valid JSON.
    #[error("failed to parse manifest at {:?}", path.display())]
    Parse {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Manifest is valid JSON, but not an object.
    #[error("manifest at {:?} is not a JSON object", path.display())]
    NotAnObject { path: PathBuf },

    /// Manifest cannot be serialized.
    #[error("failed to serialize manifest for {:?}", path.display())]
    Serialize {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Manifest cannot be written.
    #[error("failed to write manifest at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;
