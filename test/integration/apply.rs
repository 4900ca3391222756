// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::DirFixture;

use anyhow::Result;
use h2diff::{apply_template_diff, FixedTemplate};
use indoc::indoc;
use pretty_assertions::assert_eq;
use serde_json::json;

const TEMPLATE_MANIFEST: &str = indoc! {r#"
    {
      "name": "skeleton",
      "scripts": {
        "build": "shopify hydrogen build --codegen",
        "dev": "shopify hydrogen dev --codegen"
      },
      "dependencies": {
        "@shopify/cli-hydrogen": "^9.0.0",
        "react": "^18.2.0"
      },
      "devDependencies": {
        "prettier": "^3.0.0",
        "typescript": "^5.2.2"
      }
    }
"#};

const DIFF_MANIFEST: &str = indoc! {r#"
    {
      "name": "example-diff",
      "h2:diff": {
        "skipFiles": ["app/routes/_index.tsx"],
        "skipDependencies": ["lodash"],
        "skipDevDependencies": ["prettier"]
      },
      "scripts": {
        "build": "shopify hydrogen build --diff --codegen",
        "dev": "shopify hydrogen dev --codegen --diff"
      },
      "dependencies": {
        "@shopify/cli-hydrogen": "file:../../packages/cli",
        "zod": "^3.22.0",
        "lodash": "^4.17.21"
      }
    }
"#};

fn template() -> Result<DirFixture> {
    DirFixture::new(&[
        ("package.json", TEMPLATE_MANIFEST),
        ("tsconfig.json", "template tsconfig"),
        ("CHANGELOG.md", "# skeleton"),
        ("app/root.tsx", "template root"),
        ("app/entry.server.tsx", "template entry"),
        ("app/routes/_index.tsx", "template index"),
        (".shopify/project.json", "{}"),
        ("dist/server/index.js", "built"),
        ("node_modules/react/index.js", "react"),
        (".turbo/cache", "cache"),
    ])
}

fn diff() -> Result<DirFixture> {
    DirFixture::new(&[
        ("package.json", DIFF_MANIFEST),
        ("tsconfig.json", "diff tsconfig"),
        ("app/root.tsx", "diff root"),
        ("app/routes/products.tsx", "diff products"),
        ("dist/client/index.js", "diff build"),
        (".cache/entry", "cache"),
    ])
}

#[tokio::test]
async fn diff_wins_over_template() -> Result<()> {
    let (template, diff, target) = (template()?, diff()?, DirFixture::new(&[])?);

    apply_template_diff(
        target.path(),
        diff.path(),
        Some(template.path().to_path_buf()),
        &FixedTemplate::new(template.path()),
    )
    .await?;

    assert_eq!(target.read("app/root.tsx").as_deref(), Some("diff root"));
    assert_eq!(target.read("app/routes/products.tsx").as_deref(), Some("diff products"));
    assert_eq!(target.read("app/entry.server.tsx").as_deref(), Some("template entry"));
    assert_eq!(target.read("tsconfig.json").as_deref(), Some("template tsconfig"));

    Ok(())
}

#[tokio::test]
async fn excluded_paths_never_reach_target() -> Result<()> {
    let (template, diff, target) = (template()?, diff()?, DirFixture::new(&[])?);

    let options = apply_template_diff(
        target.path(),
        diff.path(),
        None,
        &FixedTemplate::new(template.path()),
    )
    .await?;
    assert_eq!(options.skip_files, vec!["app/routes/_index.tsx".to_string()]);

    for excluded in [
        "CHANGELOG.md",
        ".shopify",
        "dist",
        "node_modules",
        ".turbo",
        ".cache",
        "app/routes/_index.tsx",
    ] {
        assert!(!target.contains(excluded), "{excluded} leaked into target");
    }

    Ok(())
}

#[tokio::test]
async fn merged_manifest_follows_diff_rules() -> Result<()> {
    let (template, diff, target) = (template()?, diff()?, DirFixture::new(&[])?);

    apply_template_diff(
        target.path(),
        diff.path(),
        None,
        &FixedTemplate::new(template.path()),
    )
    .await?;

    let expect = json!({
        "name": "example-diff",
        "scripts": {
            "build": "shopify hydrogen build --codegen",
            "dev": "shopify hydrogen dev --codegen"
        },
        "dependencies": {
            "@shopify/cli-hydrogen": "^9.0.0",
            "react": "^18.2.0",
            "zod": "^3.22.0"
        },
        "devDependencies": {
            "typescript": "^5.2.2"
        }
    });
    assert_eq!(target.manifest()?, expect);

    let written = target.read("package.json").unwrap_or_default();
    assert!(written.ends_with("}\n"));
    assert!(!written.contains("h2:diff"));

    let deps = target.manifest()?["dependencies"]
        .as_object()
        .map(|deps| deps.keys().cloned().collect::<Vec<_>>())
        .unwrap_or_default();
    assert_eq!(deps, vec!["@shopify/cli-hydrogen", "react", "zod"]);

    Ok(())
}

#[tokio::test]
async fn application_is_deterministic() -> Result<()> {
    let (template, diff) = (template()?, diff()?);
    let (first, second) = (DirFixture::new(&[])?, DirFixture::new(&[])?);
    let locator = FixedTemplate::new(template.path());

    apply_template_diff(first.path(), diff.path(), None, &locator).await?;
    apply_template_diff(second.path(), diff.path(), None, &locator).await?;

    for file in ["package.json", "tsconfig.json", "app/root.tsx", "app/entry.server.tsx"] {
        assert_eq!(first.read(file), second.read(file), "{file} differs");
    }

    Ok(())
}

#[tokio::test]
async fn missing_diff_manifest_is_fatal() -> Result<()> {
    let template = template()?;
    let diff = DirFixture::new(&[("app/root.tsx", "diff root")])?;
    let target = DirFixture::new(&[])?;

    let result = apply_template_diff(
        target.path(),
        diff.path(),
        None,
        &FixedTemplate::new(template.path()),
    )
    .await;

    assert!(result.is_err());

    Ok(())
}
