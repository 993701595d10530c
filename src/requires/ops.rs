//! Operator chains
//!
//! Config and property requirements express their assertions as a chain
//! of `[operator, operand?]` steps applied left to right, each step
//! feeding its output to the next. The final value's truthiness is the
//! chain result. The operator set is closed; unknown names fail at load.

use serde_yaml::Value;

use crate::error::DefinitionError;
use crate::props::scalar_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    Truth,
    Not,
    Length,
}

impl Operator {
    fn parse(name: &str) -> Result<Self, DefinitionError> {
        Ok(match name {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "lt" => Operator::Lt,
            "le" => Operator::Le,
            "gt" => Operator::Gt,
            "ge" => Operator::Ge,
            "contains" => Operator::Contains,
            "truth" => Operator::Truth,
            "not" => Operator::Not,
            "length" => Operator::Length,
            other => return Err(DefinitionError::UnknownOperator(other.to_string())),
        })
    }

    fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Contains => "contains",
            Operator::Truth => "truth",
            Operator::Not => "not",
            Operator::Length => "length",
        }
    }

    fn takes_operand(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::Ne
                | Operator::Lt
                | Operator::Le
                | Operator::Gt
                | Operator::Ge
                | Operator::Contains
        )
    }

    fn apply(&self, current: &Value, operand: Option<&Value>) -> Value {
        match self {
            Operator::Truth => Value::Bool(truthy(current)),
            Operator::Not => Value::Bool(!truthy(current)),
            Operator::Length => Value::Number(length(current).into()),
            Operator::Contains => {
                let needle = operand.and_then(scalar_string).unwrap_or_default();
                let found = match current {
                    Value::String(s) => s.contains(&needle),
                    Value::Sequence(items) => items
                        .iter()
                        .any(|i| scalar_string(i).as_deref() == Some(needle.as_str())),
                    _ => false,
                };
                Value::Bool(found)
            }
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt
            | Operator::Ge => {
                let ordering = compare(current, operand);
                let pass = match (self, ordering) {
                    (Operator::Eq, Some(o)) => o == std::cmp::Ordering::Equal,
                    (Operator::Ne, Some(o)) => o != std::cmp::Ordering::Equal,
                    (Operator::Ne, None) => true,
                    (Operator::Lt, Some(o)) => o == std::cmp::Ordering::Less,
                    (Operator::Le, Some(o)) => o != std::cmp::Ordering::Greater,
                    (Operator::Gt, Some(o)) => o == std::cmp::Ordering::Greater,
                    (Operator::Ge, Some(o)) => o != std::cmp::Ordering::Less,
                    _ => false,
                };
                Value::Bool(pass)
            }
        }
    }
}

/// Compare two values: numerically when both sides parse as numbers,
/// as strings otherwise. Non-scalar input compares as nothing.
fn compare(current: &Value, operand: Option<&Value>) -> Option<std::cmp::Ordering> {
    let left = scalar_string(current)?;
    let right = operand.and_then(scalar_string)?;
    if let (Ok(l), Ok(r)) = (left.parse::<f64>(), right.parse::<f64>()) {
        return l.partial_cmp(&r);
    }
    Some(left.cmp(&right))
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(items) => !items.is_empty(),
        Value::Mapping(m) => !m.is_empty(),
        Value::Tagged(_) => true,
    }
}

fn length(value: &Value) -> u64 {
    match value {
        Value::Null => 0,
        Value::String(s) => s.chars().count() as u64,
        Value::Sequence(items) => items.len() as u64,
        Value::Mapping(m) => m.len() as u64,
        Value::Bool(_) | Value::Number(_) | Value::Tagged(_) => 1,
    }
}

/// A parsed `ops:` chain.
#[derive(Debug, Clone)]
pub struct OpChain {
    steps: Vec<(Operator, Option<Value>)>,
}

impl OpChain {
    /// Parse `[[gt, 4], [lt, 10]]`. A step may also be a bare operator
    /// name when it takes no operand.
    pub fn parse(at: &str, value: &Value) -> Result<Self, DefinitionError> {
        let Value::Sequence(raw_steps) = value else {
            return Err(DefinitionError::invalid(
                at,
                "'ops' must be a list of [operator, operand?] steps",
            ));
        };
        let mut steps = Vec::with_capacity(raw_steps.len());
        for raw in raw_steps {
            let (op, operand) = match raw {
                Value::String(name) => (Operator::parse(name)?, None),
                Value::Sequence(parts) => {
                    let name = parts
                        .first()
                        .and_then(scalar_string)
                        .ok_or_else(|| DefinitionError::invalid(at, "empty ops step"))?;
                    (Operator::parse(&name)?, parts.get(1).cloned())
                }
                _ => {
                    return Err(DefinitionError::invalid(
                        at,
                        "an ops step is an operator name or [operator, operand]",
                    ))
                }
            };
            if op.takes_operand() && operand.is_none() {
                return Err(DefinitionError::invalid(
                    at,
                    format!("operator '{}' needs an operand", op.as_str()),
                ));
            }
            if !op.takes_operand() && operand.is_some() {
                return Err(DefinitionError::invalid(
                    at,
                    format!("operator '{}' takes no operand", op.as_str()),
                ));
            }
            steps.push((op, operand));
        }
        if steps.is_empty() {
            return Err(DefinitionError::invalid(at, "'ops' must not be empty"));
        }
        Ok(Self { steps })
    }

    /// The default chain when a definition gives none: plain truthiness.
    pub fn truthiness() -> Self {
        Self {
            steps: vec![(Operator::Truth, None)],
        }
    }

    /// One-step chain for definitions that name a single comparison
    /// operator, like the systemd `op` key.
    pub fn single(at: &str, name: &str, operand: Value) -> Result<Self, DefinitionError> {
        let op = Operator::parse(name)?;
        if !op.takes_operand() {
            return Err(DefinitionError::invalid(
                at,
                format!("operator '{name}' cannot compare a state"),
            ));
        }
        Ok(Self {
            steps: vec![(op, Some(operand))],
        })
    }

    pub fn apply(&self, input: &Value) -> bool {
        let mut current = input.clone();
        for (op, operand) in &self.steps {
            current = op.apply(&current, operand.as_ref());
        }
        truthy(&current)
    }

    /// Compact rendering for cache entries, e.g. `gt 4, lt 10`.
    pub fn describe(&self) -> String {
        self.steps
            .iter()
            .map(|(op, operand)| match operand.as_ref().and_then(scalar_string) {
                Some(operand) => format!("{} {}", op.as_str(), operand),
                None => op.as_str().to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(yaml: &str) -> OpChain {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        OpChain::parse("t", &value).unwrap()
    }

    #[test]
    fn test_numeric_comparison_when_both_numeric() {
        assert!(chain("[[gt, 4]]").apply(&Value::String("10".into())));
        // lexical would say "10" < "4"
        assert!(!chain("[[lt, 4]]").apply(&Value::String("10".into())));
    }

    #[test]
    fn test_string_comparison_fallback() {
        assert!(chain("[[eq, enabled]]").apply(&Value::String("enabled".into())));
        assert!(chain("[[lt, b]]").apply(&Value::String("a".into())));
    }

    #[test]
    fn test_chain_feeds_forward() {
        // length of the list, then compared
        let items: Value = serde_yaml::from_str("[a, b, c]").unwrap();
        assert!(chain("[[length], [ge, 3]]").apply(&items));
        assert!(!chain("[[length], [gt, 3]]").apply(&items));
    }

    #[test]
    fn test_truth_and_not() {
        assert!(chain("[[truth]]").apply(&Value::String("anything".into())));
        assert!(!chain("[[truth]]").apply(&Value::Null));
        assert!(chain("[[not]]").apply(&Value::Bool(false)));
    }

    #[test]
    fn test_contains() {
        assert!(chain("[[contains, quorum]]").apply(&Value::String("out of quorum".into())));
        let items: Value = serde_yaml::from_str("[a, b]").unwrap();
        assert!(chain("[[contains, b]]").apply(&items));
        assert!(!chain("[[contains, z]]").apply(&items));
    }

    #[test]
    fn test_unknown_operator_fails() {
        let value: Value = serde_yaml::from_str("[[matches, x]]").unwrap();
        let err = OpChain::parse("t", &value).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownOperator(name) if name == "matches"));
    }

    #[test]
    fn test_missing_operand_fails() {
        let value: Value = serde_yaml::from_str("[[gt]]").unwrap();
        assert!(OpChain::parse("t", &value).is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(chain("[[gt, 4], [lt, 10]]").describe(), "gt 4, lt 10");
        assert_eq!(chain("[truth]").describe(), "truth");
    }
}
