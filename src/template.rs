// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Template diff application.
//!
//! A __diff__ is a small project that only contains the files that differ
//! from a __starter template__. Applying a diff produces a complete project by
//! layering the diff on top of the template inside of a __target__ directory.
//!
//! # Merge Order
//!
//! Application happens in strictly sequential steps, because each step
//! depends on what the previous one left on disk:
//!
//! 1. Template is copied into target, minus build output, dependency and
//!    cache directories, the reserved `.shopify` configuration directory, the
//!    changelog, and any file listed in the diff's `skipFiles` option.
//! 2. Diff is copied into target on top of the template, minus the same
//!    build directories and the `package.json` and `tsconfig.json` files.
//!    Diff files overwrite template files sharing their relative path.
//! 3. Diff manifest is merged into target manifest.
//!
//! A failed application leaves target in an unspecified state. Callers should
//! throw it away.
//!
//! # See Also
//!
//! 1. [`manifest`](crate::manifest)
//! 2. [`copy`](crate::copy)

use crate::{
    config::{DiffOptions, DIFF_OPTIONS_KEY},
    copy::{copy_dir, exists, CopyOptions, PathFilter},
    manifest::{merge_manifest, read_manifest, rules::diff_rules, MergeOptions, MANIFEST_FILE},
};

use std::{
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
};
use tracing::{debug, info, instrument};

/// Build output, dependency, and cache directories never copied anywhere.
pub const BUILD_DIRS: [&str; 4] = ["dist", "node_modules", ".cache", ".turbo"];

/// Reserved directory holding linked storefront configuration.
pub const SHOPIFY_CONFIG_DIR: &str = ".shopify";

/// Template changelog, meaningless inside of a merged project.
pub const CHANGELOG_FILE: &str = "CHANGELOG.md";

/// TypeScript configuration file, always taken from template.
pub const TSCONFIG_FILE: &str = "tsconfig.json";

/// Locate starter template on disk.
///
/// Implementations decide where templates come from, e.g., a monorepo
/// checkout, or an installed package.
pub trait TemplateLocator: Send + Sync {
    /// Resolve absolute path to starter template.
    fn locate(
        &self,
        prefer_monorepo: bool,
    ) -> Pin<Box<dyn Future<Output = Result<PathBuf>> + Send + '_>>;
}

/// Locate template at a fixed path.
#[derive(Debug, Clone)]
pub struct FixedTemplate(PathBuf);

impl FixedTemplate {
    /// Construct new fixed template locator.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }
}

impl TemplateLocator for FixedTemplate {
    fn locate(
        &self,
        _prefer_monorepo: bool,
    ) -> Pin<Box<dyn Future<Output = Result<PathBuf>> + Send + '_>> {
        Box::pin(async move {
            match tokio::fs::metadata(&self.0).await {
                Ok(metadata) if metadata.is_dir() => Ok(self.0.clone()),
                _ => Err(ApplyError::TemplateNotFound {
                    path: self.0.clone(),
                }),
            }
        })
    }
}

/// Relative location of starter template inside of a monorepo checkout.
pub const MONOREPO_TEMPLATE_DIR: &str = "templates/skeleton";

/// Locate template inside of a monorepo checkout.
///
/// Walks up from a starting directory until a directory containing
/// [`MONOREPO_TEMPLATE_DIR`] with a manifest is found. If monorepo sources
/// are not preferred, or none are found, the fallback path is used instead.
#[derive(Debug, Clone)]
pub struct MonorepoTemplate {
    start: PathBuf,
    fallback: Option<PathBuf>,
}

impl MonorepoTemplate {
    /// Construct new monorepo locator starting search at `start`.
    pub fn new(start: impl Into<PathBuf>) -> Self {
        Self {
            start: start.into(),
            fallback: None,
        }
    }

    /// Use `fallback` when no monorepo template is found.
    pub fn with_fallback(mut self, fallback: impl Into<PathBuf>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    async fn search(&self) -> Option<PathBuf> {
        for ancestor in self.start.ancestors() {
            let candidate = ancestor.join(MONOREPO_TEMPLATE_DIR);
            if exists(candidate.join(MANIFEST_FILE)).await {
                return Some(candidate);
            }
        }

        None
    }
}

impl TemplateLocator for MonorepoTemplate {
    fn locate(
        &self,
        prefer_monorepo: bool,
    ) -> Pin<Box<dyn Future<Output = Result<PathBuf>> + Send + '_>> {
        Box::pin(async move {
            if prefer_monorepo {
                if let Some(found) = self.search().await {
                    debug!("found monorepo template at {:?}", found.display());
                    return Ok(found);
                }
            }

            let Some(fallback) = &self.fallback else {
                return Err(ApplyError::TemplateNotFound {
                    path: self.start.join(MONOREPO_TEMPLATE_DIR),
                });
            };

            let fixed = FixedTemplate::new(fallback);
            fixed.locate(prefer_monorepo).await
        })
    }
}

/// Filter applied when copying template into target.
pub fn template_filter(template: impl Into<PathBuf>, options: &DiffOptions) -> PathFilter {
    PathFilter::new(template)
        .with_excluded_names(
            BUILD_DIRS
                .iter()
                .chain([SHOPIFY_CONFIG_DIR, CHANGELOG_FILE].iter()),
        )
        .with_skip_files(&options.skip_files)
}

/// Filter applied when copying diff into target.
pub fn diff_filter(diff: impl Into<PathBuf>) -> PathFilter {
    PathFilter::new(diff).with_excluded_names(
        BUILD_DIRS
            .iter()
            .chain([MANIFEST_FILE, TSCONFIG_FILE].iter()),
    )
}

/// Apply diff on top of starter template inside of target directory.
///
/// If `template` is not given, it is resolved through `locator`. Returns the
/// diff options the merge was performed with.
///
/// # Errors
///
/// - Return [`ApplyError::TemplateNotFound`] if template cannot be located.
/// - Return [`ApplyError::Manifest`] if either manifest cannot be read,
///   parsed, or merged.
/// - Return [`ApplyError::Copy`] if any file cannot be copied.
#[instrument(skip(target, diff, template, locator), level = "debug")]
pub async fn apply_template_diff(
    target: impl AsRef<Path>,
    diff: impl AsRef<Path>,
    template: Option<PathBuf>,
    locator: &dyn TemplateLocator,
) -> Result<DiffOptions> {
    let (target, diff) = (target.as_ref(), diff.as_ref());
    let template = match template {
        Some(template) => template,
        None => locator.locate(true).await?,
    };
    info!(
        "apply diff {:?} over template {:?}",
        diff.display(),
        template.display()
    );

    let (diff_manifest, template_manifest) = tokio::try_join!(
        read_manifest(diff.join(MANIFEST_FILE)),
        read_manifest(template.join(MANIFEST_FILE)),
    )?;
    let options = DiffOptions::from_manifest(&diff_manifest);
    debug!("diff options: {options:?}");

    let copied = copy_dir(
        &template,
        target,
        CopyOptions::new().filter(template_filter(&template, &options)),
    )
    .await?;
    debug!("copied {} template files", copied.len());

    let copied = copy_dir(diff, target, CopyOptions::new().filter(diff_filter(diff))).await?;
    debug!("copied {} diff files", copied.len());

    merge_manifest(
        target.join(MANIFEST_FILE),
        diff.join(MANIFEST_FILE),
        MergeOptions {
            ignored_keys: vec![DIFF_OPTIONS_KEY],
            rules: diff_rules(&template_manifest, &options),
        },
    )
    .await?;

    Ok(options)
}

/// Template diff application error types.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Starter template cannot be located.
    #[error("cannot locate starter template at {:?}", path.display())]
    TemplateNotFound { path: PathBuf },

    /// Manifest cannot be read, parsed, or merged.
    #[error(transparent)]
    Manifest(#[from] crate::manifest::ManifestError),

    /// Files cannot be copied.
    #[error(transparent)]
    Copy(#[from] crate::copy::CopyError),
}

/// Friendly result alias :3
pub type Result<T, E = ApplyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn template_filter_excludes_reserved_paths() {
        let options = DiffOptions {
            skip_files: vec!["app/routes/_index.tsx".into()],
            ..Default::default()
        };
        let filter = template_filter("/template", &options);

        assert!(filter.excludes(".shopify/project.json"));
        assert!(filter.excludes("CHANGELOG.md"));
        assert!(filter.excludes(".turbo/cache"));
        assert!(filter.excludes("app/routes/_index.tsx"));
        assert!(!filter.excludes("package.json"));
        assert!(!filter.excludes("tsconfig.json"));
    }

    #[test]
    fn diff_filter_excludes_manifests() {
        let filter = diff_filter("/diff");

        assert!(filter.excludes("package.json"));
        assert!(filter.excludes("tsconfig.json"));
        assert!(filter.excludes("dist/client/index.js"));
        assert!(!filter.excludes(".shopify/project.json"));
        assert!(!filter.excludes("CHANGELOG.md"));
    }

    #[tokio::test]
    async fn fixed_template_requires_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let located = FixedTemplate::new(dir.path()).locate(true).await?;
        assert_eq!(located, dir.path());

        let missing = FixedTemplate::new(dir.path().join("missing")).locate(true).await;
        assert!(matches!(missing, Err(ApplyError::TemplateNotFound { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn monorepo_template_searches_ancestors() -> anyhow::Result<()> {
        let repo = tempfile::tempdir()?;
        let skeleton = repo.path().join(MONOREPO_TEMPLATE_DIR);
        let fallback = repo.path().join("installed");
        tokio::fs::create_dir_all(&skeleton).await?;
        tokio::fs::create_dir_all(&fallback).await?;
        tokio::fs::write(skeleton.join(MANIFEST_FILE), "{}").await?;
        let start = repo.path().join("examples/my-diff");

        let locator = MonorepoTemplate::new(&start).with_fallback(&fallback);
        assert_eq!(locator.locate(true).await?, skeleton);
        assert_eq!(locator.locate(false).await?, fallback);

        let outside = tempfile::tempdir()?;
        let missing = MonorepoTemplate::new(outside.path()).locate(true).await;
        assert!(matches!(missing, Err(ApplyError::TemplateNotFound { .. })));

        Ok(())
    }
}
