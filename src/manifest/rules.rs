// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manifest mutation rules.
//!
//! Once a diff manifest has been folded into the template manifest, a few
//! independent fixups have to happen before the result is usable:
//!
//! 1. The CLI package is pinned back to the version the template declares,
//!    because the diff pins it to a wildcard.
//! 2. The `--diff` flag is stripped from build scripts, since the merged
//!    project is a regular project and not a diff anymore.
//! 3. Dependencies that the diff asked to skip are removed.
//!
//! Each fixup is a named [`ManifestRule`]. Rules are applied in sequence, so
//! their order matters only when two rules touch the same entry.

use crate::config::DiffOptions;

use regex::Regex;
use serde_json::Value;

/// Package whose version is always taken from the template manifest.
pub const CLI_PACKAGE: &str = "@shopify/cli-hydrogen";

/// Command-line flag only meaningful while working on a diff.
pub const DIFF_FLAG: &str = "--diff";

/// Scripts that may carry [`DIFF_FLAG`].
pub const FLAGGED_SCRIPTS: [&str; 3] = ["build", "dev", "preview"];

/// Version used when template does not declare [`CLI_PACKAGE`].
pub const WILDCARD_VERSION: &str = "*";

/// A single named mutation over a merged manifest.
pub trait ManifestRule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Mutate manifest in place.
    fn apply(&self, manifest: &mut Value);
}

/// Pin a dependency to a fixed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinDependency {
    package: String,
    version: String,
}

impl PinDependency {
    /// Construct new pin rule.
    pub fn new(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
        }
    }

    /// Pin [`CLI_PACKAGE`] to version declared by template manifest.
    ///
    /// Falls back to [`WILDCARD_VERSION`] when template does not declare it.
    pub fn from_template(template: &Value) -> Self {
        let version = template
            .get("dependencies")
            .and_then(|deps| deps.get(CLI_PACKAGE))
            .and_then(Value::as_str)
            .filter(|version| !version.is_empty())
            .unwrap_or(WILDCARD_VERSION);

        Self::new(CLI_PACKAGE, version)
    }
}

impl ManifestRule for PinDependency {
    fn name(&self) -> &str {
        "pin-dependency"
    }

    fn apply(&self, manifest: &mut Value) {
        let Some(root) = manifest.as_object_mut() else {
            return;
        };

        let deps = root
            .entry("dependencies")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Some(deps) = deps.as_object_mut() {
            deps.insert(self.package.clone(), Value::String(self.version.clone()));
        }
    }
}

/// Remove a command-line flag from selected scripts.
///
/// Only matches the flag as a whole token preceded by whitespace, so
/// `--diffuse` or `x--diff` stay untouched.
#[derive(Debug, Clone)]
pub struct StripScriptFlag {
    scripts: Vec<String>,
    pattern: Regex,
}

impl StripScriptFlag {
    /// Construct new flag stripping rule.
    pub fn new(flag: impl AsRef<str>, scripts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        // INVARIANT: Escaped literal cannot produce an invalid pattern.
        let pattern = Regex::new(&format!(r"\s+{}(\s|$)", regex::escape(flag.as_ref())))
            .expect("escaped literal is a valid pattern");

        Self {
            scripts: scripts.into_iter().map(Into::into).collect(),
            pattern,
        }
    }

    /// Strip [`DIFF_FLAG`] from [`FLAGGED_SCRIPTS`].
    pub fn diff_flag() -> Self {
        Self::new(DIFF_FLAG, FLAGGED_SCRIPTS)
    }

    fn strip(&self, command: &str) -> String {
        let mut result = command.to_string();

        // INVARIANT: Repeat until stable, adjacent flags share whitespace.
        loop {
            let next = self.pattern.replace_all(&result, "$1").into_owned();
            if next == result {
                return result;
            }
            result = next;
        }
    }
}

impl ManifestRule for StripScriptFlag {
    fn name(&self) -> &str {
        "strip-script-flag"
    }

    fn apply(&self, manifest: &mut Value) {
        let Some(scripts) = manifest.get_mut("scripts").and_then(Value::as_object_mut) else {
            return;
        };

        for name in &self.scripts {
            if let Some(Value::String(command)) = scripts.get_mut(name) {
                *command = self.strip(command);
            }
        }
    }
}

/// Remove named entries from one dependency section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipDependencies {
    section: &'static str,
    packages: Vec<String>,
}

impl SkipDependencies {
    /// Skip packages listed under `dependencies`.
    pub fn dependencies(packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            section: "dependencies",
            packages: packages.into_iter().map(Into::into).collect(),
        }
    }

    /// Skip packages listed under `devDependencies`.
    pub fn dev_dependencies(packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            section: "devDependencies",
            packages: packages.into_iter().map(Into::into).collect(),
        }
    }
}

impl ManifestRule for SkipDependencies {
    fn name(&self) -> &str {
        "skip-dependencies"
    }

    fn apply(&self, manifest: &mut Value) {
        let Some(section) = manifest.get_mut(self.section).and_then(Value::as_object_mut) else {
            return;
        };

        for package in &self.packages {
            section.remove(package);
        }
    }
}

/// Rules that turn a merged diff manifest into a regular project manifest.
///
/// Pins the CLI package, strips the diff flag, then drops skipped
/// dependencies in that order.
pub fn diff_rules(template: &Value, options: &DiffOptions) -> Vec<Box<dyn ManifestRule>> {
    vec![
        Box::new(PinDependency::from_template(template)),
        Box::new(StripScriptFlag::diff_flag()),
        Box::new(SkipDependencies::dependencies(options.skip_dependencies.iter().cloned())),
        Box::new(SkipDependencies::dev_dependencies(
            options.skip_dev_dependencies.iter().cloned(),
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use simple_test_case::test_case;

    #[test]
    fn pin_dependency_from_template() {
        let template = json!({"dependencies": {"@shopify/cli-hydrogen": "^3.0.0"}});
        let mut manifest = json!({"dependencies": {"@shopify/cli-hydrogen": "*", "a": "1.0.0"}});

        PinDependency::from_template(&template).apply(&mut manifest);

        assert_eq!(
            manifest,
            json!({"dependencies": {"@shopify/cli-hydrogen": "^3.0.0", "a": "1.0.0"}})
        );
    }

    #[test]
    fn pin_dependency_falls_back_to_wildcard() {
        let mut manifest = json!({"name": "diff"});
        PinDependency::from_template(&json!({"dependencies": {}})).apply(&mut manifest);
        assert_eq!(
            manifest,
            json!({"name": "diff", "dependencies": {"@shopify/cli-hydrogen": "*"}})
        );
    }

    #[test_case("vite build --diff", "vite build"; "trailing flag")]
    #[test_case("shopify hydrogen dev --diff --port 3000", "shopify hydrogen dev --port 3000"; "inner flag")]
    #[test_case("a --diff --diff b", "a b"; "repeated flag")]
    #[test_case("vite build --diffuse", "vite build --diffuse"; "longer token")]
    #[test_case("vite build", "vite build"; "no flag")]
    #[test]
    fn strip_diff_flag(command: &str, expect: &str) {
        let mut manifest = json!({"scripts": {"build": command}});
        StripScriptFlag::diff_flag().apply(&mut manifest);
        assert_eq!(manifest["scripts"]["build"], json!(expect));
    }

    #[test]
    fn strip_diff_flag_only_touches_flagged_scripts() {
        let mut manifest = json!({
            "scripts": {
                "dev": "shopify hydrogen dev --diff",
                "preview": "shopify hydrogen preview --diff",
                "lint": "eslint --diff"
            }
        });

        StripScriptFlag::diff_flag().apply(&mut manifest);

        assert_eq!(
            manifest,
            json!({
                "scripts": {
                    "dev": "shopify hydrogen dev",
                    "preview": "shopify hydrogen preview",
                    "lint": "eslint --diff"
                }
            })
        );
    }

    #[test]
    fn skip_dependencies_by_section() {
        let mut manifest = json!({
            "dependencies": {"lodash": "4", "react": "18"},
            "devDependencies": {"lodash": "4", "prettier": "3"}
        });

        SkipDependencies::dependencies(["lodash"]).apply(&mut manifest);
        SkipDependencies::dev_dependencies(["prettier", "absent"]).apply(&mut manifest);

        assert_eq!(
            manifest,
            json!({
                "dependencies": {"react": "18"},
                "devDependencies": {"lodash": "4"}
            })
        );
    }

    #[test]
    fn diff_rules_apply_in_order() {
        let template = json!({"dependencies": {"@shopify/cli-hydrogen": "^3.0.0"}});
        let options = DiffOptions {
            skip_dependencies: vec!["@shopify/cli-hydrogen".into()],
            ..Default::default()
        };
        let mut manifest = json!({"dependencies": {"a": "1.0.0"}});

        for rule in diff_rules(&template, &options) {
            rule.apply(&mut manifest);
        }

        // Skip list runs after the pin, so it has the last word.
        assert_eq!(manifest, json!({"dependencies": {"a": "1.0.0"}}));
    }
}
