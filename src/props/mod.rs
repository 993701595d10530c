//! Typed override properties
//!
//! Each reserved override key parses into a typed property object at rule
//! load. Parsing validates shapes and registry references immediately;
//! anything that can fail because of a definition author's mistake fails
//! here, not mid-evaluation.

pub mod cache;
pub mod decision;
pub mod expr;
pub mod input;
pub mod raises;

pub use cache::{CacheRef, CacheSource, CacheValue, PropertyCache};
pub use decision::DecisionProperty;
pub use expr::ExprProperty;
pub use input::InputProperty;
pub use raises::RaisesProperty;

use crate::error::DefinitionError;
use serde_yaml::Value;

/// Render a YAML scalar as a plain string.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accept a single scalar or a list of scalars.
pub(crate) fn string_list(at: &str, value: &Value) -> Result<Vec<String>, DefinitionError> {
    if let Some(s) = scalar_string(value) {
        return Ok(vec![s]);
    }
    if let Value::Sequence(items) = value {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match scalar_string(item) {
                Some(s) => out.push(s),
                None => {
                    return Err(DefinitionError::invalid(
                        at,
                        "expected a scalar or a list of scalars",
                    ))
                }
            }
        }
        return Ok(out);
    }
    Err(DefinitionError::invalid(
        at,
        "expected a scalar or a list of scalars",
    ))
}
