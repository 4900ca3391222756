// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Directory tree built from `(path, contents)` pairs.
pub(crate) struct DirFixture {
    root: TempDir,
}

impl DirFixture {
    pub(crate) fn new(files: &[(&str, &str)]) -> Result<Self> {
        let fixture = Self {
            root: tempfile::tempdir()?,
        };

        for (path, contents) in files {
            fixture.write(path, contents)?;
        }

        Ok(fixture)
    }

    pub(crate) fn path(&self) -> &Path {
        self.root.path()
    }

    pub(crate) fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.path().join(relative)
    }

    pub(crate) fn write(&self, relative: impl AsRef<Path>, contents: impl AsRef<str>) -> Result<()> {
        let path = self.join(relative);

        // INVARIANT: Always create missing parents before writing file.
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents.as_ref())?;

        Ok(())
    }

    pub(crate) fn read(&self, relative: impl AsRef<Path>) -> Option<String> {
        std::fs::read_to_string(self.join(relative)).ok()
    }

    pub(crate) fn contains(&self, relative: impl AsRef<Path>) -> bool {
        self.join(relative).exists()
    }

    pub(crate) fn manifest(&self) -> Result<serde_json::Value> {
        let data = std::fs::read_to_string(self.join("package.json"))?;
        Ok(serde_json::from_str(&data)?)
    }
}
