//! Raises property: what a reached conclusion or matched bug emits

use serde_yaml::Value;

use crate::error::DefinitionError;
use crate::issues::FindingKind;
use crate::props::cache::{CacheRef, CacheSource};
use crate::props::scalar_string;

#[derive(Debug)]
enum TemplateValue {
    Literal(String),
    Reference(CacheRef),
}

/// Finding kind, message template and its substitutions. Template
/// placeholders are `{key}` for `format-dict` entries and `{}` for the
/// positional `format-groups` taken from a search match. Cache
/// references inside the dict resolve lazily, at the moment the finding
/// is raised; a reference that resolves to nothing leaves its
/// placeholder untouched.
#[derive(Debug)]
pub struct RaisesProperty {
    kind: FindingKind,
    bug_id: Option<String>,
    message: String,
    format_dict: Vec<(String, TemplateValue)>,
    format_groups: Vec<usize>,
}

impl RaisesProperty {
    pub fn parse(at: &str, value: &Value) -> Result<Self, DefinitionError> {
        Self::parse_with_kind(at, value, FindingKind::PotentialIssue)
    }

    /// Parse with a caller-chosen default kind. Bug definitions default
    /// to `known-bug` while scenario conclusions default to
    /// `potential-issue`.
    pub fn parse_with_kind(
        at: &str,
        value: &Value,
        default_kind: FindingKind,
    ) -> Result<Self, DefinitionError> {
        let Value::Mapping(m) = value else {
            return Err(DefinitionError::invalid(at, "'raises' must be a mapping"));
        };

        let kind = match m.get("kind") {
            Some(v) => scalar_string(v)
                .ok_or_else(|| DefinitionError::invalid(at, "'kind' must be a string"))?
                .parse()?,
            None => default_kind,
        };

        let bug_id = match m.get("bug-id") {
            Some(v) => Some(
                scalar_string(v)
                    .ok_or_else(|| DefinitionError::invalid(at, "'bug-id' must be scalar"))?,
            ),
            None => None,
        };

        let message = m
            .get("message")
            .and_then(scalar_string)
            .ok_or_else(|| DefinitionError::invalid(at, "'raises' needs a string 'message'"))?;

        let mut format_dict = Vec::new();
        if let Some(dict) = m.get("format-dict") {
            let Value::Mapping(dict) = dict else {
                return Err(DefinitionError::invalid(at, "'format-dict' must be a mapping"));
            };
            for (k, v) in dict {
                let (Some(key), Some(raw)) = (k.as_str(), scalar_string(v)) else {
                    return Err(DefinitionError::invalid(
                        at,
                        "'format-dict' entries must be scalar",
                    ));
                };
                let value = match CacheRef::parse(&raw)? {
                    Some(r) => TemplateValue::Reference(r),
                    None => TemplateValue::Literal(raw),
                };
                format_dict.push((key.to_string(), value));
            }
        }

        let mut format_groups = Vec::new();
        if let Some(groups) = m.get("format-groups") {
            let Value::Sequence(items) = groups else {
                return Err(DefinitionError::invalid(
                    at,
                    "'format-groups' must be a list of group positions",
                ));
            };
            for item in items {
                match item.as_u64() {
                    Some(n) if n >= 1 => format_groups.push(n as usize),
                    _ => {
                        return Err(DefinitionError::invalid(
                            at,
                            "'format-groups' positions are 1-based integers",
                        ))
                    }
                }
            }
        }

        Ok(Self {
            kind,
            bug_id,
            message,
            format_dict,
            format_groups,
        })
    }

    pub fn kind(&self) -> FindingKind {
        self.kind
    }

    pub fn bug_id(&self) -> Option<&str> {
        self.bug_id.as_deref()
    }

    pub fn has_format_groups(&self) -> bool {
        !self.format_groups.is_empty()
    }

    /// Render the message. `groups` are the captured groups of the first
    /// matched search result, when the trigger was a pattern match.
    pub fn message(&self, caches: &dyn CacheSource, groups: &[Option<String>]) -> String {
        let mut message = self.message.clone();

        for &position in &self.format_groups {
            let Some(Some(value)) = groups.get(position - 1) else {
                continue;
            };
            message = replace_first(&message, "{}", value);
        }

        for (key, value) in &self.format_dict {
            let rendered = match value {
                TemplateValue::Literal(s) => Some(s.clone()),
                TemplateValue::Reference(r) => r.resolve(caches),
            };
            if let Some(rendered) = rendered {
                message = message.replace(&format!("{{{key}}}"), &rendered);
            }
        }

        message
    }
}

fn replace_first(haystack: &str, needle: &str, replacement: &str) -> String {
    match haystack.find(needle) {
        Some(pos) => {
            let mut out = String::with_capacity(haystack.len() + replacement.len());
            out.push_str(&haystack[..pos]);
            out.push_str(replacement);
            out.push_str(&haystack[pos + needle.len()..]);
            out
        }
        None => haystack.to_string(),
    }
}
