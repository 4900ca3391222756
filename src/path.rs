// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, and translate paths between the three directories of a
//! diff session.

use std::path::{Component, Path, PathBuf};

/// Determine default absolute path to session configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/h2diff/config.toml` as the
/// default absolute path. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_session_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("h2diff").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Express `path` relative to `root`.
///
/// Returns [`None`] if `path` does not live under `root`, or is `root` itself.
pub fn relative_to(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Option<PathBuf> {
    let relative = path.as_ref().strip_prefix(root.as_ref()).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }

    Some(relative.to_path_buf())
}

/// Join a relative path onto `root` without letting it escape.
///
/// Rejects absolute paths and any `..` component so a relative path taken
/// from one directory can never address a file outside of another.
pub fn rebase(root: impl AsRef<Path>, relative: impl AsRef<Path>) -> Option<PathBuf> {
    let relative = relative.as_ref();
    let escapes = relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes {
        return None;
    }

    Some(root.as_ref().join(relative))
}

/// Render relative path with forward slashes for pattern matching.
pub fn to_slash(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test]
    fn relative_to_strips_root() {
        assert_eq!(
            relative_to("/tmp/diff", "/tmp/diff/app/root.tsx"),
            Some(PathBuf::from("app/root.tsx"))
        );
        assert_eq!(relative_to("/tmp/diff", "/tmp/diff"), None);
        assert_eq!(relative_to("/tmp/diff", "/tmp/template/app/root.tsx"), None);
    }

    #[test_case("app/root.tsx", Some("/x/app/root.tsx"); "nested file")]
    #[test_case("./env.d.ts", Some("/x/./env.d.ts"); "current dir prefix")]
    #[test_case("../escape.ts", None; "parent dir")]
    #[test_case("/etc/passwd", None; "absolute")]
    #[test]
    fn rebase_rejects_escapes(relative: &str, expect: Option<&str>) {
        assert_eq!(rebase("/x", relative), expect.map(PathBuf::from));
    }

    #[test]
    fn to_slash_joins_normal_components() {
        assert_eq!(to_slash(Path::new("app").join("routes").join("x.tsx")), "app/routes/x.tsx");
    }
}
