// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::DirFixture;

use anyhow::Result;
use h2diff::{sync::watch::NotifyBackend, DiffSession, FixedTemplate, SessionConfig};
use pretty_assertions::assert_eq;

fn template() -> Result<DirFixture> {
    DirFixture::new(&[
        ("package.json", r#"{"name": "skeleton", "dependencies": {"react": "^18.2.0"}}"#),
        ("app/root.tsx", "template root"),
    ])
}

fn diff() -> Result<DirFixture> {
    DirFixture::new(&[
        ("package.json", r#"{"name": "example-diff"}"#),
        ("app/root.tsx", "diff root"),
        ("dist/stale.js", "stale"),
    ])
}

async fn prepare(template: &DirFixture, diff: &DirFixture, config: SessionConfig) -> Result<DiffSession> {
    let session = DiffSession::prepare(
        diff.path(),
        &config,
        &FixedTemplate::new(template.path()),
        NotifyBackend::new(),
    )
    .await?;

    Ok(session)
}

#[tokio::test]
async fn prepare_creates_fresh_target() -> Result<()> {
    let (template, diff) = (template()?, diff()?);

    let mut first = prepare(&template, &diff, SessionConfig::default()).await?;
    let mut second = prepare(&template, &diff, SessionConfig::default()).await?;

    assert_ne!(first.target(), second.target());
    assert_eq!(
        std::fs::read_to_string(first.target().join("app/root.tsx"))?,
        "diff root"
    );
    assert_eq!(first.template(), template.path());
    assert!(first.active_watches().is_empty());
    assert!(first.diagnostics().is_none());

    first.cleanup().await?;
    second.cleanup().await?;

    Ok(())
}

#[tokio::test]
async fn cleanup_twice_is_harmless() -> Result<()> {
    let (template, diff) = (template()?, diff()?);
    let mut session = prepare(&template, &diff, SessionConfig::default()).await?;
    let target = session.target().to_path_buf();

    session.cleanup().await?;
    assert!(!target.exists());
    session.cleanup().await?;

    Ok(())
}

#[tokio::test]
async fn dependency_store_is_linked() -> Result<()> {
    let (template, diff) = (template()?, diff()?);
    let store = DirFixture::new(&[("react/index.js", "react")])?;
    let config = SessionConfig {
        dependency_store: Some(store.path().to_path_buf()),
        ..Default::default()
    };

    let mut session = prepare(&template, &diff, config).await?;
    let link = session.target().join("node_modules");

    assert!(std::fs::symlink_metadata(&link)?.file_type().is_symlink());
    assert_eq!(std::fs::read_to_string(link.join("react/index.js"))?, "react");

    // Removing the merged project must not follow the link.
    session.cleanup().await?;
    assert!(store.contains("react/index.js"));

    Ok(())
}

#[tokio::test]
async fn pull_back_shopify_config() -> Result<()> {
    let (template, diff) = (template()?, diff()?);
    let mut session = prepare(&template, &diff, SessionConfig::default()).await?;

    // Nothing to pull back yet.
    session.copy_shopify_config().await?;
    assert!(!diff.contains(".shopify"));

    diff.write(".shopify/old.json", "old")?;
    std::fs::create_dir_all(session.target().join(".shopify"))?;
    std::fs::write(session.target().join(".shopify/project.json"), "linked")?;
    session.copy_shopify_config().await?;

    assert_eq!(diff.read(".shopify/project.json").as_deref(), Some("linked"));
    assert!(!diff.contains(".shopify/old.json"));

    session.cleanup().await?;

    Ok(())
}

#[tokio::test]
async fn pull_back_build_output() -> Result<()> {
    let (template, diff) = (template()?, diff()?);
    let mut session = prepare(&template, &diff, SessionConfig::default()).await?;

    std::fs::create_dir_all(session.target().join("dist/server"))?;
    std::fs::write(session.target().join("dist/server/index.js"), "built")?;
    std::fs::write(session.target().join(".env"), "SESSION_SECRET=foo")?;
    session.copy_diff_build().await?;

    assert_eq!(diff.read("dist/server/index.js").as_deref(), Some("built"));
    assert_eq!(diff.read(".env").as_deref(), Some("SESSION_SECRET=foo"));
    assert!(!diff.contains("dist/stale.js"));

    session.cleanup().await?;

    Ok(())
}
