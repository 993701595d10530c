//! Config-check rules
//!
//! A config-check leaf names a config handler (plus optional path),
//! a set of assertions and an optional custom message. No log search is
//! involved: the handler reads the file out of the snapshot and every
//! failing assertion raises a potential issue. A custom message collapses
//! all failures into one finding with the failing keys substituted for
//! `{keys}`.

use log::debug;
use serde_yaml::{Mapping, Value};

use crate::context::RunContext;
use crate::defs::{DefTree, NodeId};
use crate::error::{DefinitionError, EvalError};
use crate::issues::{FindingKind, IssueSink};
use crate::props::scalar_string;
use crate::requires::{AssertionOutcome, ConfigRequirement, RequiresProperty};

/// Loads config-check definitions for one rule group and raises findings
/// for failing assertions.
pub struct ConfigChecker<'ctx> {
    ctx: &'ctx RunContext,
}

impl<'ctx> ConfigChecker<'ctx> {
    pub fn new(ctx: &'ctx RunContext) -> Self {
        Self { ctx }
    }

    /// Returns the number of findings raised.
    pub fn run(&self, tree: &DefTree, sink: &IssueSink) -> Result<usize, EvalError> {
        let mut count = 0;
        for leaf in tree.leaf_sections() {
            count += self.run_check(tree, leaf, sink)?;
        }
        Ok(count)
    }

    fn run_check(&self, tree: &DefTree, leaf: NodeId, sink: &IssueSink) -> Result<usize, EvalError> {
        let at = tree.path(leaf);
        let node = tree.node(leaf);

        if let Some(raw) = tree.resolved(leaf, "requires") {
            let mut gate = RequiresProperty::parse(&at, raw, self.ctx)?;
            if !gate.evaluate(self.ctx)? {
                debug!("config check '{at}' gate failed, skipping");
                return Ok(0);
            }
        }

        let config_raw = tree
            .resolved(leaf, "config")
            .ok_or_else(|| DefinitionError::invalid(&at, "a config check needs a 'config'"))?;
        let assertions_raw = node
            .override_raw("assertions")
            .ok_or_else(|| DefinitionError::invalid(&at, "a config check needs 'assertions'"))?;
        let requirement =
            ConfigRequirement::parse(&at, &merge(&at, config_raw, assertions_raw)?, self.ctx)?;

        let failed: Vec<AssertionOutcome> = requirement
            .outcomes(self.ctx)?
            .into_iter()
            .filter(|o| !o.passed)
            .collect();
        if failed.is_empty() {
            return Ok(0);
        }

        match node.override_raw("message").and_then(scalar_string) {
            Some(template) => {
                let keys: Vec<&str> = failed.iter().map(|o| o.key.as_str()).collect();
                let message = template.replace("{keys}", &keys.join(", "));
                sink.add(FindingKind::PotentialIssue, message, &at);
                Ok(1)
            }
            None => {
                for outcome in &failed {
                    sink.add(FindingKind::PotentialIssue, describe(outcome), &at);
                }
                Ok(failed.len())
            }
        }
    }
}

/// Fold the leaf's `config` mapping and its `assertions` into the single
/// mapping shape `ConfigRequirement::parse` takes.
fn merge(at: &str, config: &Value, assertions: &Value) -> Result<Value, DefinitionError> {
    let Value::Mapping(config) = config else {
        return Err(DefinitionError::invalid(at, "'config' must be a mapping"));
    };
    let mut merged = Mapping::new();
    for (k, v) in config {
        merged.insert(k.clone(), v.clone());
    }
    merged.insert(
        Value::String("assertions".to_string()),
        assertions.clone(),
    );
    Ok(Value::Mapping(merged))
}

fn describe(outcome: &AssertionOutcome) -> String {
    let key = match &outcome.section {
        Some(section) => format!("{}:{}", section, outcome.key),
        None => outcome.key.clone(),
    };
    match &outcome.actual {
        Some(actual) => format!(
            "config key '{}' has value '{}', expected '{}'",
            key, actual, outcome.expected
        ),
        None => format!("config key '{}' is unset, expected '{}'", key, outcome.expected),
    }
}
