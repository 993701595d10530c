//! Reserved override key names
//!
//! These keys are reserved at every level of a definition document: a
//! mapping key matching one of them attaches a typed property to the
//! current section instead of opening a child section.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Core override keys (search expressions, inputs, checks, conclusions).
const CORE_KEYS: &[&str] = &[
    "input",
    "requires",
    "expr",
    "start",
    "body",
    "end",
    "hint",
    "checks",
    "conclusions",
    "decision",
    "raises",
    "priority",
    "check-parameters",
];

/// Keys used by the event and config-check variants.
const VARIANT_KEYS: &[&str] = &["passthrough-results", "config", "assertions", "message"];

static OVERRIDE_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    CORE_KEYS
        .iter()
        .chain(VARIANT_KEYS.iter())
        .copied()
        .collect()
});

/// Whether a mapping key is a reserved override name.
pub fn is_override(key: &str) -> bool {
    OVERRIDE_KEYS.contains(key)
}
