// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::DirFixture;

use anyhow::Result;
use h2diff::{
    sync::{route::Side, watch::NotifyBackend},
    DiffSession, FixedTemplate, SessionConfig,
};
use pretty_assertions::assert_eq;
use std::{
    path::Path,
    time::{Duration, Instant},
};

async fn wait_for(path: &Path, expect: Option<&str>) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let found = std::fs::read_to_string(path).ok();
        if found.as_deref() == expect {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn live_sync_follows_diff_and_template() -> Result<()> {
    let template = DirFixture::new(&[
        ("package.json", r#"{"name": "skeleton"}"#),
        ("app/root.tsx", "template root"),
        ("app/entry.server.tsx", "template entry"),
    ])?;
    let diff = DirFixture::new(&[
        ("package.json", r#"{"name": "example-diff"}"#),
        ("app/root.tsx", "diff root"),
    ])?;
    let config = SessionConfig {
        watch: true,
        ..Default::default()
    };

    let mut session = DiffSession::prepare(
        diff.path(),
        &config,
        &FixedTemplate::new(template.path()),
        NotifyBackend::new(),
    )
    .await?;
    assert_eq!(
        session.active_watches(),
        vec![Side::Target, Side::Diff, Side::Template]
    );
    let target = session.target().to_path_buf();

    diff.write("app/routes/products.tsx", "products")?;
    assert!(wait_for(&target.join("app/routes/products.tsx"), Some("products")).await);

    // Diff keeps priority over template edits.
    template.write("app/root.tsx", "template root v2")?;
    template.write("app/entry.server.tsx", "template entry v2")?;
    assert!(wait_for(&target.join("app/entry.server.tsx"), Some("template entry v2")).await);
    assert_eq!(
        std::fs::read_to_string(target.join("app/root.tsx"))?,
        "diff root"
    );

    // Deleting a diff override restores template version.
    std::fs::remove_file(diff.join("app/root.tsx"))?;
    assert!(wait_for(&target.join("app/root.tsx"), Some("template root v2")).await);

    // Generated types flow back into diff.
    std::fs::write(target.join("storefrontapi.generated.d.ts"), "types")?;
    assert!(wait_for(&diff.join("storefrontapi.generated.d.ts"), Some("types")).await);

    session.cleanup().await?;
    assert!(!target.exists());
    assert!(session.active_watches().is_empty());

    Ok(())
}
