//! Namespace parsing and pattern matching for hierarchical execution scopes
//!
//! A scope is an ordered sequence of `(type, id)` pairs describing nested
//! execution (root graph, then subgraph, then nested subgraph, ...). This
//! module turns that sequence into the two strings the rest of the crate
//! actually operates on: a **display name** (every component, joined) and
//! a **pattern** (only the type components, joined) — and answers whether
//! a given pattern is eligible for token streaming under a
//! [`TokenStreamConfig`].

use std::collections::HashSet;

/// A scope, flattened to its `[type, id, type, id, ...]` components.
///
/// The empty namespace is the root graph, canonically displayed as
/// `"main"`.
pub type Namespace = Vec<String>;

/// Reserved display name for the root (empty) scope.
pub const ROOT_DISPLAY_NAME: &str = "main";

/// Sentinel pattern that enables every namespace.
pub const ALL_NAMESPACES: &str = "all";

/// Join a namespace into its display name (`"main"` if empty).
pub fn display_name(namespace: &Namespace) -> String {
    if namespace.is_empty() {
        ROOT_DISPLAY_NAME.to_string()
    } else {
        namespace.join(":")
    }
}

/// Extract the type-only pattern from a namespace (indices 0, 2, 4, ...).
pub fn pattern(namespace: &Namespace) -> String {
    if namespace.is_empty() {
        return ROOT_DISPLAY_NAME.to_string();
    }
    namespace
        .iter()
        .step_by(2)
        .cloned()
        .collect::<Vec<_>>()
        .join(":")
}

/// Extract the type-only pattern directly from an already-joined display
/// name, per §4.1's "split on `:`, take even indices, rejoin" rule.
pub fn pattern_from_display(display: &str) -> String {
    if display == ROOT_DISPLAY_NAME {
        return ROOT_DISPLAY_NAME.to_string();
    }
    display
        .split(':')
        .step_by(2)
        .collect::<Vec<_>>()
        .join(":")
}

/// The leaf `(node_name, task_id)` pair, if the namespace is non-empty.
pub fn leaf(namespace: &Namespace) -> Option<(String, String)> {
    if namespace.len() < 2 {
        return None;
    }
    let n = namespace.len();
    Some((namespace[n - 2].clone(), namespace[n - 1].clone()))
}

/// The leaf node name from an already-joined display name, or `None` for
/// the root scope.
pub fn node_name_from_display(display: &str) -> Option<String> {
    if display == ROOT_DISPLAY_NAME {
        return None;
    }
    let parts: Vec<&str> = display.split(':').collect();
    if parts.len() < 2 {
        return None;
    }
    Some(parts[parts.len() - 2].to_string())
}

/// Token-streaming eligibility configuration (§3.3).
#[derive(Debug, Clone, Default)]
pub struct TokenStreamConfig {
    /// Namespace patterns enabled for token streaming. `"all"` enables
    /// every namespace. A trailing `:*` enables a pattern and everything
    /// nested under it.
    pub enabled_namespaces: HashSet<String>,
    /// Namespace patterns excluded from token streaming. Exclusion always
    /// wins over enablement, and is matched exactly (no wildcard
    /// expansion — `spec.md` defines the `:*` suffix only for
    /// `enabled_namespaces`).
    pub excluded_namespaces: HashSet<String>,
    /// If set, only messages carrying one of these tags are streamed.
    pub message_tags: Option<HashSet<String>>,
    /// Whether tool-call lifecycle events are emitted alongside token
    /// deltas.
    pub include_tool_calls: bool,
}

impl TokenStreamConfig {
    /// Build a config enabling every namespace, with no exclusions.
    pub fn enable_all() -> Self {
        Self {
            enabled_namespaces: HashSet::from([ALL_NAMESPACES.to_string()]),
            ..Default::default()
        }
    }

    /// Whether token streaming is configured to do anything at all — used
    /// by mode selection (§4.7) to decide if `Messages` mode must be
    /// requested.
    pub fn is_active(&self) -> bool {
        !self.enabled_namespaces.is_empty() || self.include_tool_calls
    }

    /// Decide eligibility for a scope's display name, applying the match
    /// rules of §4.1 in order: exclusion wins, then the `"all"` sentinel,
    /// then prefix/exact enabled-entry matching.
    pub fn is_scope_eligible(&self, display: &str) -> bool {
        let pat = pattern_from_display(display);

        if self.excluded_namespaces.contains(&pat) {
            return false;
        }

        if self.enabled_namespaces.contains(ALL_NAMESPACES) {
            return true;
        }

        self.enabled_namespaces
            .iter()
            .any(|entry| matches_enabled_entry(entry, &pat))
    }

    /// Whether a message's tags pass the configured tag filter. Absent
    /// configuration (`None`) means no filtering; an empty tag set on the
    /// message never matches a non-empty filter.
    pub fn passes_tag_filter(&self, message_tags: &[String]) -> bool {
        match &self.message_tags {
            None => true,
            Some(required) => message_tags.iter().any(|t| required.contains(t)),
        }
    }
}

fn matches_enabled_entry(entry: &str, pattern: &str) -> bool {
    match entry.strip_suffix(":*") {
        Some(prefix) => pattern == prefix || pattern.starts_with(&format!("{prefix}:")),
        None => pattern == entry,
    }
}
