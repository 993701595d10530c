//! Search expression property (`expr`, `start`, `body`, `end`)

use serde_yaml::Value;

use crate::error::DefinitionError;
use crate::props::{scalar_string, string_list};

/// Pattern alternatives plus an optional cheap pre-filter hint. Patterns
/// are carried verbatim; compilation happens when they are registered
/// with the searcher.
#[derive(Debug, Clone)]
pub struct ExprProperty {
    patterns: Vec<String>,
    hint: Option<String>,
}

impl ExprProperty {
    /// Accepts a bare pattern (string or list of alternatives) or a
    /// mapping carrying `expr` and an optional `hint` sub-key, the form
    /// sequence `start`/`body`/`end` entries use.
    pub fn parse(at: &str, value: &Value) -> Result<Self, DefinitionError> {
        match value {
            Value::Mapping(m) => {
                let expr = m
                    .get("expr")
                    .ok_or_else(|| DefinitionError::invalid(at, "missing 'expr'"))?;
                let patterns = string_list(at, expr)?;
                let hint = match m.get("hint") {
                    Some(h) => Some(scalar_string(h).ok_or_else(|| {
                        DefinitionError::invalid(at, "'hint' must be a string")
                    })?),
                    None => None,
                };
                Ok(Self { patterns, hint })
            }
            other => Ok(Self {
                patterns: string_list(at, other)?,
                hint: None,
            }),
        }
    }

    /// Use a section-level hint when the expression carries none itself.
    pub fn or_hint(mut self, hint: Option<String>) -> Self {
        if self.hint.is_none() {
            self.hint = hint;
        }
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
}
