// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for configuration data that h2diff uses. There are two
//! sources of configuration: the __diff options__ that a diff project keeps
//! inside its own `package.json`, and the __session configuration__ file that
//! tells h2diff where the starter template and shared dependency store live.
//!
//! # Diff Options
//!
//! A diff project may carry a reserved top-level key named `h2:diff` in its
//! manifest. This key lists template files that should never be copied into
//! the merged project, and dependencies that should be dropped from the merged
//! manifest:
//!
//! ```json
//! {
//!   "h2:diff": {
//!     "skipFiles": ["app/routes/_index.tsx"],
//!     "skipDependencies": ["lodash"],
//!     "skipDevDependencies": ["prettier"]
//!   }
//! }
//! ```
//!
//! The key itself never leaks into the merged manifest.
//!
//! # Session Configuration
//!
//! Session configuration is plain TOML. Every field is optional:
//!
//! ```toml
//! template = "$HOME/src/hydrogen/templates/skeleton"
//! dependency_store = "$HOME/src/hydrogen/node_modules"
//! watch = true
//! prefer_monorepo_template = true
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument, warn};

/// Reserved manifest key holding [`DiffOptions`].
pub const DIFF_OPTIONS_KEY: &str = "h2:diff";

/// Options a diff project declares about how it should be merged.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiffOptions {
    /// Template paths, relative to the template root, that must not be copied.
    pub skip_files: Vec<String>,

    /// Dependencies to drop from the merged manifest.
    pub skip_dependencies: Vec<String>,

    /// Development dependencies to drop from the merged manifest.
    pub skip_dev_dependencies: Vec<String>,
}

impl DiffOptions {
    /// Extract diff options from a parsed diff manifest.
    ///
    /// Falls back to empty options if the reserved key is missing or does not
    /// have the expected shape. Malformed options are not fatal.
    pub fn from_manifest(manifest: &Value) -> Self {
        let Some(raw) = manifest.get(DIFF_OPTIONS_KEY) else {
            return Self::default();
        };

        match serde_json::from_value(raw.clone()) {
            Ok(options) => options,
            Err(error) => {
                warn!("ignoring malformed {DIFF_OPTIONS_KEY:?} options: {error}");
                Self::default()
            }
        }
    }
}

/// Session configuration layout.
///
/// Determines where the external collaborators of a diff session live, and
/// whether live synchronization should run.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Explicit path to starter template.
    pub template: Option<PathBuf>,

    /// Shared dependency directory to link into merged project.
    pub dependency_store: Option<PathBuf>,

    /// Keep merged project synchronized after initial merge.
    pub watch: bool,

    /// Prefer template source from monorepo checkout when locating template.
    pub prefer_monorepo_template: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            template: None,
            dependency_store: None,
            watch: false,
            prefer_monorepo_template: true,
        }
    }
}

impl SessionConfig {
    /// Load session configuration from target path.
    ///
    /// A missing file is not an error, the default configuration is used
    /// instead.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file contents are invalid.
    /// - Return [`ConfigError::ShellExpansion`] if path expansion fails.
    #[instrument(skip(path), level = "debug")]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no session configuration at {:?}", path.display());
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(ConfigError::Read {
                    source: err,
                    path: path.to_path_buf(),
                })
            }
        };

        data.parse()
    }
}

impl FromStr for SessionConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: SessionConfig = toml::de::from_str(data)?;

        // INVARIANT: Perform shell expansion on every path field.
        config.template = config.template.map(expand_path).transpose()?;
        config.dependency_store = config.dependency_store.map(expand_path).transpose()?;

        Ok(config)
    }
}

impl Display for SessionConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())?.into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
