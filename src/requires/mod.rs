//! Requirement trees
//!
//! The `requires` override holds a single typed requirement, a mapping of
//! boolean operator groups, or a list mixing both. Evaluation is
//! deliberately exhaustive: every branch runs even when the outcome is
//! already decided, so cache data captured along the way stays available
//! to message templates.

pub mod config;
pub mod ops;
pub mod package;
pub mod property;
pub mod service;
pub mod snap;

use serde_yaml::Value;

use crate::context::RunContext;
use crate::error::{DefinitionError, EvalError};
use crate::props::cache::PropertyCache;

pub use config::{AssertionOutcome, ConfigRequirement};
pub use package::AptRequirement;
pub use property::PropertyRequirement;
pub use service::SystemdRequirement;
pub use snap::SnapRequirement;

/// Boolean grouping operators. `Not` is a NOR: it passes only when every
/// member is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

impl BoolOp {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "and" => Some(BoolOp::And),
            "or" => Some(BoolOp::Or),
            "not" => Some(BoolOp::Not),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BoolOp::And => "and",
            BoolOp::Or => "or",
            BoolOp::Not => "not",
        }
    }

    pub fn finalize(&self, results: &[bool]) -> bool {
        match self {
            BoolOp::And => results.iter().all(|r| *r),
            BoolOp::Or => results.iter().any(|r| *r),
            BoolOp::Not => !results.iter().any(|r| *r),
        }
    }
}

const TYPE_KEYS: &[&str] = &["apt", "snap", "systemd", "config", "property"];

/// One typed requirement. Dispatch is closed; an unknown type key fails
/// at load.
#[derive(Debug)]
pub enum Requirement {
    Apt(AptRequirement),
    Snap(SnapRequirement),
    Systemd(SystemdRequirement),
    Config(ConfigRequirement),
    Property(PropertyRequirement),
}

impl Requirement {
    fn parse(at: &str, key: &str, value: &Value, ctx: &RunContext) -> Result<Self, DefinitionError> {
        Ok(match key {
            "apt" => Requirement::Apt(AptRequirement::parse(at, value)?),
            "snap" => Requirement::Snap(SnapRequirement::parse(at, value)?),
            "systemd" => Requirement::Systemd(SystemdRequirement::parse(at, value)?),
            "config" => Requirement::Config(ConfigRequirement::parse(at, value, ctx)?),
            "property" => Requirement::Property(PropertyRequirement::parse(at, value, ctx)?),
            other => return Err(DefinitionError::UnknownRequirement(other.to_string())),
        })
    }

    fn evaluate(&self, ctx: &RunContext, cache: &mut PropertyCache) -> Result<bool, EvalError> {
        match self {
            Requirement::Apt(r) => r.evaluate(ctx, cache),
            Requirement::Snap(r) => r.evaluate(ctx, cache),
            Requirement::Systemd(r) => r.evaluate(ctx, cache),
            Requirement::Config(r) => r.evaluate(ctx, cache),
            Requirement::Property(r) => r.evaluate(ctx, cache),
        }
    }
}

/// Parsed shape of a `requires` value.
#[derive(Debug)]
pub enum RequirementTree {
    Single(Requirement),
    /// One entry per operator key, in definition order.
    Groups(Vec<(BoolOp, Vec<RequirementTree>)>),
    /// List form: every entry must pass (implicit `and`).
    All(Vec<RequirementTree>),
}

impl RequirementTree {
    pub fn parse(at: &str, value: &Value, ctx: &RunContext) -> Result<Self, DefinitionError> {
        match value {
            Value::Mapping(m) => {
                let mut typed: Vec<(&str, &Value)> = Vec::new();
                let mut groups: Vec<(BoolOp, &Value)> = Vec::new();
                for (k, v) in m {
                    let Some(key) = k.as_str() else {
                        return Err(DefinitionError::invalid(at, "requirement keys must be strings"));
                    };
                    if let Some(op) = BoolOp::parse(key) {
                        groups.push((op, v));
                    } else if TYPE_KEYS.contains(&key) {
                        typed.push((key, v));
                    } else {
                        return Err(DefinitionError::UnknownRequirement(key.to_string()));
                    }
                }
                match (typed.len(), groups.len()) {
                    (0, 0) => Err(DefinitionError::invalid(at, "empty requirement")),
                    (_, 0) if typed.len() == 1 => {
                        let (key, v) = typed[0];
                        Ok(RequirementTree::Single(Requirement::parse(at, key, v, ctx)?))
                    }
                    (_, 0) => Err(DefinitionError::invalid(
                        at,
                        "a requirement mapping takes exactly one type key",
                    )),
                    (0, _) => {
                        let mut parsed = Vec::with_capacity(groups.len());
                        for (op, members) in groups {
                            parsed.push((op, Self::parse_members(at, members, ctx)?));
                        }
                        Ok(RequirementTree::Groups(parsed))
                    }
                    _ => Err(DefinitionError::invalid(
                        at,
                        "cannot mix requirement types and operator groups in one mapping",
                    )),
                }
            }
            Value::Sequence(items) => {
                let members = items
                    .iter()
                    .map(|item| Self::parse(at, item, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                if members.is_empty() {
                    return Err(DefinitionError::invalid(at, "empty requirement list"));
                }
                Ok(RequirementTree::All(members))
            }
            _ => Err(DefinitionError::invalid(
                at,
                "'requires' must be a mapping or a list",
            )),
        }
    }

    fn parse_members(
        at: &str,
        value: &Value,
        ctx: &RunContext,
    ) -> Result<Vec<RequirementTree>, DefinitionError> {
        match value {
            Value::Sequence(items) => {
                let members = items
                    .iter()
                    .map(|item| Self::parse(at, item, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                if members.is_empty() {
                    return Err(DefinitionError::invalid(at, "empty operator group"));
                }
                Ok(members)
            }
            Value::Mapping(_) => Ok(vec![Self::parse(at, value, ctx)?]),
            _ => Err(DefinitionError::invalid(
                at,
                "an operator group takes a requirement or list of requirements",
            )),
        }
    }

    /// Evaluate the whole tree. Every member of every group is evaluated
    /// before any operator is finalized; nothing short-circuits across
    /// groups. Cache entries from later requirements overwrite earlier
    /// ones key-wise.
    pub fn evaluate(&self, ctx: &RunContext, cache: &mut PropertyCache) -> Result<bool, EvalError> {
        match self {
            RequirementTree::Single(req) => req.evaluate(ctx, cache),
            RequirementTree::Groups(groups) => {
                let mut overall = true;
                for (op, members) in groups {
                    let mut results = Vec::with_capacity(members.len());
                    for member in members {
                        results.push(member.evaluate(ctx, cache)?);
                    }
                    overall &= op.finalize(&results);
                }
                Ok(overall)
            }
            RequirementTree::All(members) => {
                let mut results = Vec::with_capacity(members.len());
                for member in members {
                    results.push(member.evaluate(ctx, cache)?);
                }
                Ok(results.iter().all(|r| *r))
            }
        }
    }
}

/// The `requires` override: a requirement tree plus the cache its
/// evaluation populates.
#[derive(Debug)]
pub struct RequiresProperty {
    tree: RequirementTree,
    cache: PropertyCache,
}

impl RequiresProperty {
    pub fn parse(at: &str, value: &Value, ctx: &RunContext) -> Result<Self, DefinitionError> {
        Ok(Self {
            tree: RequirementTree::parse(at, value, ctx)?,
            cache: PropertyCache::new(),
        })
    }

    pub fn evaluate(&mut self, ctx: &RunContext) -> Result<bool, EvalError> {
        self.tree.evaluate(ctx, &mut self.cache)
    }

    pub fn cache(&self) -> &PropertyCache {
        &self.cache
    }
}
