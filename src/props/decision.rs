//! Decision property: a conclusion's boolean tree over check names

use serde_yaml::Value;

use crate::error::DefinitionError;
use crate::props::{scalar_string, string_list};
use crate::requires::BoolOp;

/// A bare check name or a nested operator tree over check names. `not`
/// keeps its NOR semantics from requirement groups.
#[derive(Debug)]
pub enum DecisionProperty {
    Check(String),
    Group {
        op: BoolOp,
        members: Vec<DecisionProperty>,
    },
}

impl DecisionProperty {
    pub fn parse(at: &str, value: &Value) -> Result<Self, DefinitionError> {
        match value {
            Value::Mapping(m) => {
                let mut groups = Vec::new();
                for (k, v) in m {
                    let Some(key) = k.as_str() else {
                        return Err(DefinitionError::invalid(at, "decision keys must be strings"));
                    };
                    let Some(op) = BoolOp::parse(key) else {
                        return Err(DefinitionError::UnknownOperator(key.to_string()));
                    };
                    groups.push(DecisionProperty::Group {
                        op,
                        members: Self::parse_members(at, v)?,
                    });
                }
                match groups.len() {
                    0 => Err(DefinitionError::invalid(at, "empty decision")),
                    1 => Ok(groups.remove(0)),
                    // several operator keys combine like requirement
                    // groups: all must hold
                    _ => Ok(DecisionProperty::Group {
                        op: BoolOp::And,
                        members: groups,
                    }),
                }
            }
            Value::Sequence(_) => Ok(DecisionProperty::Group {
                op: BoolOp::And,
                members: Self::parse_members(at, value)?,
            }),
            other => {
                let name = scalar_string(other)
                    .ok_or_else(|| DefinitionError::invalid(at, "expected a check name"))?;
                Ok(DecisionProperty::Check(name))
            }
        }
    }

    fn parse_members(at: &str, value: &Value) -> Result<Vec<DecisionProperty>, DefinitionError> {
        match value {
            Value::Sequence(items) => {
                if items.is_empty() {
                    return Err(DefinitionError::invalid(at, "empty decision group"));
                }
                items.iter().map(|item| Self::parse(at, item)).collect()
            }
            Value::Mapping(_) => Ok(vec![Self::parse(at, value)?]),
            other => Ok(string_list(at, other)?
                .into_iter()
                .map(DecisionProperty::Check)
                .collect()),
        }
    }

    /// Every check name the tree mentions, for load-time validation.
    pub fn check_names(&self) -> Vec<&str> {
        match self {
            DecisionProperty::Check(name) => vec![name.as_str()],
            DecisionProperty::Group { members, .. } => {
                members.iter().flat_map(|m| m.check_names()).collect()
            }
        }
    }

    /// Evaluate against memoized check results. Lookups cannot miss:
    /// names were validated when the scenario loaded.
    pub fn reached(&self, result_of: &dyn Fn(&str) -> bool) -> bool {
        match self {
            DecisionProperty::Check(name) => result_of(name),
            DecisionProperty::Group { op, members } => {
                let results: Vec<bool> = members.iter().map(|m| m.reached(result_of)).collect();
                op.finalize(&results)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(yaml: &str) -> DecisionProperty {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        DecisionProperty::parse("t", &value).unwrap()
    }

    fn lookup<'a>(truthy: &'a [&'a str]) -> impl Fn(&str) -> bool + 'a {
        move |name| truthy.contains(&name)
    }

    #[test]
    fn test_bare_check_name() {
        let d = decision("has_errors");
        assert!(d.reached(&lookup(&["has_errors"])));
        assert!(!d.reached(&lookup(&[])));
        assert_eq!(d.check_names(), ["has_errors"]);
    }

    #[test]
    fn test_and_or() {
        let d = decision("{and: [c1, c2]}");
        assert!(d.reached(&lookup(&["c1", "c2"])));
        assert!(!d.reached(&lookup(&["c1"])));

        let d = decision("{or: [c1, c2]}");
        assert!(d.reached(&lookup(&["c2"])));
    }

    #[test]
    fn test_not_is_a_nor() {
        let d = decision("{not: [c1, c2]}");
        assert!(d.reached(&lookup(&[])));
        assert!(!d.reached(&lookup(&["c2"])));
    }

    #[test]
    fn test_list_is_implicit_and() {
        let d = decision("[c1, c2]");
        assert!(d.reached(&lookup(&["c1", "c2"])));
        assert!(!d.reached(&lookup(&["c2"])));
    }

    #[test]
    fn test_nested_tree() {
        let d = decision("{and: [c1, {or: [c2, c3]}]}");
        assert!(d.reached(&lookup(&["c1", "c3"])));
        assert!(!d.reached(&lookup(&["c3"])));
        let mut names = d.check_names();
        names.sort_unstable();
        assert_eq!(names, ["c1", "c2", "c3"]);
    }

    #[test]
    fn test_unknown_operator_fails() {
        let value: Value = serde_yaml::from_str("{xor: [c1, c2]}").unwrap();
        let err = DecisionProperty::parse("t", &value).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownOperator(name) if name == "xor"));
    }
}
