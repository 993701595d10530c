//! config file requirement

use std::path::Path;

use log::debug;
use serde_yaml::Value;

use crate::context::RunContext;
use crate::error::{DefinitionError, EvalError};
use crate::props::cache::PropertyCache;
use crate::props::scalar_string;
use crate::requires::ops::OpChain;

#[derive(Debug)]
struct Assertion {
    key: String,
    section: Option<String>,
    ops: OpChain,
    allow_unset: bool,
}

/// Result of applying one assertion to the loaded config.
#[derive(Debug)]
pub struct AssertionOutcome {
    pub key: String,
    pub section: Option<String>,
    pub actual: Option<String>,
    pub expected: String,
    pub passed: bool,
}

/// Applies assertion op-chains to values read through a registered
/// config handler. The overall result is the AND of all per-key results,
/// optionally inverted.
#[derive(Debug)]
pub struct ConfigRequirement {
    handler: String,
    path: Option<String>,
    assertions: Vec<Assertion>,
    invert_result: bool,
}

impl ConfigRequirement {
    pub fn parse(at: &str, value: &Value, ctx: &RunContext) -> Result<Self, DefinitionError> {
        let Value::Mapping(m) = value else {
            return Err(DefinitionError::invalid(at, "'config' must be a mapping"));
        };

        let handler = m
            .get("handler")
            .and_then(scalar_string)
            .ok_or_else(|| DefinitionError::invalid(at, "'config' needs a 'handler'"))?;
        if ctx.config_handlers().get(&handler).is_none() {
            return Err(DefinitionError::UnknownConfigHandler(handler));
        }

        let path = m.get("path").and_then(scalar_string);

        let invert_result = m
            .get("invert-result")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let Some(Value::Mapping(raw)) = m.get("assertions") else {
            return Err(DefinitionError::invalid(
                at,
                "'config' needs an 'assertions' mapping",
            ));
        };
        let mut assertions = Vec::new();
        for (k, v) in raw {
            let Some(key) = k.as_str() else {
                return Err(DefinitionError::invalid(at, "assertion keys must be strings"));
            };
            assertions.push(parse_assertion(at, key, v)?);
        }
        if assertions.is_empty() {
            return Err(DefinitionError::invalid(at, "'assertions' is empty"));
        }

        Ok(Self {
            handler,
            path,
            assertions,
            invert_result,
        })
    }

    /// Apply every assertion to the loaded config, in definition order.
    pub fn outcomes(&self, ctx: &RunContext) -> Result<Vec<AssertionOutcome>, EvalError> {
        let Some(handler) = ctx.config_handlers().get(&self.handler) else {
            return Err(DefinitionError::UnknownConfigHandler(self.handler.clone()).into());
        };
        let config = handler.load(ctx.data_root(), self.path.as_deref().map(Path::new));

        let mut outcomes = Vec::with_capacity(self.assertions.len());
        for assertion in &self.assertions {
            let actual = config.get(&assertion.key, assertion.section.as_deref());
            let passed = match actual {
                None => assertion.allow_unset,
                Some(v) => assertion.ops.apply(&Value::String(v.to_string())),
            };
            if !passed {
                debug!(
                    "config key '{}' value '{}' failed '{}'",
                    assertion.key,
                    actual.unwrap_or("unset"),
                    assertion.ops.describe()
                );
            }
            outcomes.push(AssertionOutcome {
                key: assertion.key.clone(),
                section: assertion.section.clone(),
                actual: actual.map(str::to_string),
                expected: assertion.ops.describe(),
                passed,
            });
        }
        Ok(outcomes)
    }

    pub fn evaluate(&self, ctx: &RunContext, cache: &mut PropertyCache) -> Result<bool, EvalError> {
        let outcomes = self.outcomes(ctx)?;

        // cache the first failing assertion, else the last one
        let cached = outcomes
            .iter()
            .find(|o| !o.passed)
            .or_else(|| outcomes.last());
        if let Some(outcome) = cached {
            cache.put("key", outcome.key.as_str());
            cache.put("value", outcome.actual.clone().unwrap_or_default());
            cache.put("ops", outcome.expected.as_str());
        }

        let all = outcomes.iter().all(|o| o.passed);
        Ok(if self.invert_result { !all } else { all })
    }
}

fn parse_assertion(at: &str, key: &str, value: &Value) -> Result<Assertion, DefinitionError> {
    let Value::Mapping(m) = value else {
        return Err(DefinitionError::invalid(
            at,
            format!("assertion '{key}' must be a mapping"),
        ));
    };
    let ops = match m.get("ops") {
        Some(v) => OpChain::parse(at, v)?,
        None => OpChain::truthiness(),
    };
    let section = m.get("section").and_then(scalar_string);
    let allow_unset = m
        .get("allow-unset")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(Assertion {
        key: key.to_string(),
        section,
        ops,
        allow_unset,
    })
}
