//! Property caches and `@`-reference resolution
//!
//! Every property carries a small insertion-ordered cache of sub-results
//! it populated while resolving itself. Other properties and conclusion
//! message templates read those caches through `@`-reference strings:
//!
//! ```text
//! @checks.<check>.<property>.<key>[:render_fn]
//! @<property>.<key>[:render_fn]
//! ```
//!
//! Unknown render functions fail at load; a reference whose cache key was
//! never populated resolves to nothing at evaluation time.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::error::DefinitionError;

/// A value cached by a property during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// Insertion-ordered, deduplicated.
    Set(Vec<String>),
    List(Vec<String>),
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheValue::Str(s) => write!(f, "{s}"),
            CacheValue::Int(i) => write!(f, "{i}"),
            CacheValue::Bool(b) => write!(f, "{b}"),
            CacheValue::Set(items) | CacheValue::List(items) => {
                write!(f, "{}", items.join(", "))
            }
        }
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        CacheValue::Str(s.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        CacheValue::Str(s)
    }
}

impl From<i64> for CacheValue {
    fn from(i: i64) -> Self {
        CacheValue::Int(i)
    }
}

impl From<usize> for CacheValue {
    fn from(n: usize) -> Self {
        CacheValue::Int(n as i64)
    }
}

impl From<bool> for CacheValue {
    fn from(b: bool) -> Self {
        CacheValue::Bool(b)
    }
}

impl From<Vec<String>> for CacheValue {
    fn from(items: Vec<String>) -> Self {
        CacheValue::List(items)
    }
}

/// Insertion-ordered key/value store owned by a single property. Small
/// enough that a linear scan beats a map.
#[derive(Debug, Default, Clone)]
pub struct PropertyCache {
    entries: Vec<(String, CacheValue)>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; replacement keeps the original position.
    pub fn put(&mut self, key: &str, value: impl Into<CacheValue>) {
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key.to_string(), value));
        }
    }

    /// Append a value to a set-valued key, creating the set on first use.
    /// Duplicates are dropped; first-seen order is kept.
    pub fn add_to_set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, CacheValue::Set(items))) => {
                if !items.iter().any(|i| i == value) {
                    items.push(value.to_string());
                }
            }
            Some(entry) => entry.1 = CacheValue::Set(vec![value.to_string()]),
            None => self
                .entries
                .push((key.to_string(), CacheValue::Set(vec![value.to_string()]))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&CacheValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Fold another cache into this one, later values replacing earlier.
    pub fn merge(&mut self, other: PropertyCache) {
        for (key, value) in other.entries {
            self.put(&key, value);
        }
    }
}

type Renderer = fn(&CacheValue) -> String;

static RENDER_FNS: Lazy<HashMap<&'static str, Renderer>> = Lazy::new(|| {
    let mut fns: HashMap<&'static str, Renderer> = HashMap::new();
    fns.insert("comma_join", render_comma_join);
    fns.insert("unique_comma_join", render_unique_comma_join);
    fns.insert("len", render_len);
    fns.insert("first", render_first);
    fns
});

fn render_comma_join(value: &CacheValue) -> String {
    match value {
        CacheValue::Set(items) | CacheValue::List(items) => items.join(", "),
        other => other.to_string(),
    }
}

fn render_unique_comma_join(value: &CacheValue) -> String {
    match value {
        CacheValue::Set(items) => items.join(", "),
        CacheValue::List(items) => {
            let mut seen: Vec<&str> = Vec::new();
            for item in items {
                if !seen.contains(&item.as_str()) {
                    seen.push(item);
                }
            }
            seen.join(", ")
        }
        other => other.to_string(),
    }
}

fn render_len(value: &CacheValue) -> String {
    let n = match value {
        CacheValue::Set(items) | CacheValue::List(items) => items.len(),
        CacheValue::Str(s) => s.chars().count(),
        CacheValue::Int(_) | CacheValue::Bool(_) => 1,
    };
    n.to_string()
}

fn render_first(value: &CacheValue) -> String {
    match value {
        CacheValue::Set(items) | CacheValue::List(items) => {
            items.first().cloned().unwrap_or_default()
        }
        other => other.to_string(),
    }
}

/// Where a reference looks its cache up. Scenarios implement this over
/// their check set; single properties implement it over themselves.
pub trait CacheSource {
    fn cache_of(&self, check: Option<&str>, property: &str) -> Option<&PropertyCache>;
}

/// A parsed `@`-reference.
pub struct CacheRef {
    check: Option<String>,
    property: String,
    key: String,
    render: Option<Renderer>,
}

impl CacheRef {
    /// Parse a template value. Returns `Ok(None)` for plain strings that
    /// are not references. Malformed references and unknown render
    /// functions are definition errors.
    pub fn parse(raw: &str) -> Result<Option<CacheRef>, DefinitionError> {
        let Some(body) = raw.strip_prefix('@') else {
            return Ok(None);
        };

        let (path, render) = match body.rsplit_once(':') {
            Some((path, name)) => {
                let renderer = RENDER_FNS
                    .get(name)
                    .copied()
                    .ok_or_else(|| DefinitionError::UnknownRenderFn(name.to_string()))?;
                (path, Some(renderer))
            }
            None => (body, None),
        };

        let segments: Vec<&str> = path.split('.').collect();
        let (check, property, key) = match segments.as_slice() {
            ["checks", check, property, key @ ..] if !key.is_empty() => {
                (Some(check.to_string()), property.to_string(), key.join("."))
            }
            [property, key @ ..] if !key.is_empty() && *property != "checks" => {
                (None, property.to_string(), key.join("."))
            }
            _ => {
                return Err(DefinitionError::invalid(
                    raw,
                    "cache references take the form \
                     '@checks.<check>.<property>.<key>' or '@<property>.<key>'",
                ));
            }
        };

        Ok(Some(CacheRef {
            check,
            property,
            key,
            render,
        }))
    }

    pub fn check(&self) -> Option<&str> {
        self.check.as_deref()
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Render the referenced value, or `None` when the cache key was
    /// never populated.
    pub fn resolve(&self, source: &dyn CacheSource) -> Option<String> {
        let cache = source.cache_of(self.check.as_deref(), &self.property)?;
        let value = cache.get(&self.key)?;
        Some(match self.render {
            Some(render) => render(value),
            None => value.to_string(),
        })
    }
}

impl fmt::Debug for CacheRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRef")
            .field("check", &self.check)
            .field("property", &self.property)
            .field("key", &self.key)
            .field("render", &self.render.is_some())
            .finish()
    }
}
