// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Event routing table for live synchronization.
//!
//! Every filesystem event observed in one of the three directories of a diff
//! session is looked up in a fixed routing table. A route names the directory
//! the event came from, the event kinds it reacts to, a path filter, and the
//! action to perform. Events that match no route are ignored.
//!
//! | Source   | Kinds           | Paths           | Action                                    |
//! |----------|-----------------|-----------------|-------------------------------------------|
//! | target   | any             | generated types | copy target to diff                       |
//! | diff     | create, update  | sources         | copy diff to target                       |
//! | diff     | delete          | sources         | restore from template, else delete target |
//! | template | create, update  | sources         | copy template to target unless in diff    |
//! | template | delete          | sources         | restore from diff, else delete target     |
//!
//! # Feedback Loops
//!
//! Actions write into directories that are watched themselves. The table is
//! laid out so that a path written by any action never matches a route in the
//! directory it was written to. Generated type declarations only flow out of
//! the target, and every other file only flows into it.

use crate::{
    manifest::MANIFEST_FILE,
    template::{BUILD_DIRS, SHOPIFY_CONFIG_DIR, TSCONFIG_FILE},
};

use glob::{MatchOptions, Pattern};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Component, Path},
    sync::LazyLock,
};

/// Pattern for type declarations generated inside of merged project.
pub const GENERATED_TYPES_PATTERN: &str = "*.generated.d.ts";

static GENERATED_TYPES: LazyLock<Pattern> = LazyLock::new(|| {
    // INVARIANT: Constant pattern is always valid.
    Pattern::new(GENERATED_TYPES_PATTERN).expect("constant glob pattern is valid")
});

/// One of the three directories of a diff session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Temporary merged project.
    Target,

    /// User's diff project.
    Diff,

    /// Starter template.
    Template,
}

impl Side {
    /// All sides in watch order.
    pub const ALL: [Side; 3] = [Side::Target, Side::Diff, Side::Template];
}

impl Display for Side {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Side::Target => "target",
            Side::Diff => "diff",
            Side::Template => "template",
        })
    }
}

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [EventKind; 3] = [EventKind::Create, EventKind::Update, EventKind::Delete];
}

/// Which paths a route reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    /// Only generated type declarations.
    GeneratedTypes,

    /// Everything but generated type declarations, manifests, the reserved
    /// configuration directory, and build directories.
    Sources,
}

impl PathClass {
    /// Check if relative path belongs to this class.
    pub fn matches(&self, relative: impl AsRef<Path>) -> bool {
        let relative = relative.as_ref();
        match self {
            PathClass::GeneratedTypes => is_generated_types(relative),
            PathClass::Sources => is_source(relative),
        }
    }
}

/// What to do with a routed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Copy path from one side to another.
    Copy { from: Side, to: Side },

    /// Copy path from one side to another, unless `shadow` has the path.
    CopyUnlessShadowed { from: Side, to: Side, shadow: Side },

    /// Copy path from `fallback` if it has it, otherwise delete it from `to`.
    RestoreOrDelete { fallback: Side, to: Side },
}

impl SyncAction {
    /// Side written to by this action.
    pub fn destination(&self) -> Side {
        match *self {
            SyncAction::Copy { to, .. } => to,
            SyncAction::CopyUnlessShadowed { to, .. } => to,
            SyncAction::RestoreOrDelete { to, .. } => to,
        }
    }
}

/// Single entry of routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub source: Side,
    pub kinds: &'static [EventKind],
    pub paths: PathClass,
    pub action: SyncAction,
}

const CHANGES: &[EventKind] = &[EventKind::Create, EventKind::Update];
const DELETES: &[EventKind] = &[EventKind::Delete];

/// Routing table for live synchronization.
pub const ROUTES: [Route; 5] = [
    Route {
        source: Side::Target,
        kinds: &EventKind::ALL,
        paths: PathClass::GeneratedTypes,
        action: SyncAction::Copy {
            from: Side::Target,
            to: Side::Diff,
        },
    },
    Route {
        source: Side::Diff,
        kinds: CHANGES,
        paths: PathClass::Sources,
        action: SyncAction::Copy {
            from: Side::Diff,
            to: Side::Target,
        },
    },
    Route {
        source: Side::Diff,
        kinds: DELETES,
        paths: PathClass::Sources,
        action: SyncAction::RestoreOrDelete {
            fallback: Side::Template,
            to: Side::Target,
        },
    },
    Route {
        source: Side::Template,
        kinds: CHANGES,
        paths: PathClass::Sources,
        action: SyncAction::CopyUnlessShadowed {
            from: Side::Template,
            to: Side::Target,
            shadow: Side::Diff,
        },
    },
    Route {
        source: Side::Template,
        kinds: DELETES,
        paths: PathClass::Sources,
        action: SyncAction::RestoreOrDelete {
            fallback: Side::Diff,
            to: Side::Target,
        },
    },
];

/// Look up action for event on relative path in source side.
///
/// Returns [`None`] if event should be ignored.
pub fn route(source: Side, kind: EventKind, relative: impl AsRef<Path>) -> Option<SyncAction> {
    let relative = relative.as_ref();
    ROUTES
        .iter()
        .find(|route| {
            route.source == source && route.kinds.contains(&kind) && route.paths.matches(relative)
        })
        .map(|route| route.action)
}

fn is_generated_types(relative: &Path) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    relative
        .file_name()
        .is_some_and(|name| GENERATED_TYPES.matches_with(&name.to_string_lossy(), options))
}

fn is_source(relative: &Path) -> bool {
    if relative.as_os_str().is_empty() || is_generated_types(relative) {
        return false;
    }

    let mut components = relative.components().filter_map(|component| match component {
        Component::Normal(part) => Some(part.to_string_lossy()),
        _ => None,
    });

    // INVARIANT: Manifests and reserved directory only count at top-level.
    let Some(first) = components.next() else {
        return false;
    };
    let is_reserved = [MANIFEST_FILE, TSCONFIG_FILE, SHOPIFY_CONFIG_DIR]
        .iter()
        .any(|name| name.eq_ignore_ascii_case(&first));
    if is_reserved {
        return false;
    }

    let is_build_dir = |part: &str| BUILD_DIRS.iter().any(|dir| dir.eq_ignore_ascii_case(part));
    !is_build_dir(&*first) && !components.any(|part| is_build_dir(&*part))
}
