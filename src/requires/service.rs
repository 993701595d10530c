//! systemd service requirement

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde_yaml::Value;

use crate::context::RunContext;
use crate::error::{DefinitionError, EvalError};
use crate::props::cache::PropertyCache;
use crate::props::scalar_string;
use crate::requires::ops::OpChain;

/// Minimum gap between two start times before `started-after` accepts
/// the ordering. Provisional: masks restart jitter observed in the field.
pub const STARTED_AFTER_GRACE_SECS: i64 = 120;

#[derive(Debug)]
struct ServiceCheck {
    name: String,
    /// Expected state word; also routes which state axis is compared
    /// (enablement, sub or active).
    expected: Option<String>,
    op: Option<OpChain>,
    started_after: Option<String>,
}

/// Passes when every listed service exists and satisfies its expected
/// state and start-ordering clauses. Bails on the first failing service.
#[derive(Debug)]
pub struct SystemdRequirement {
    services: Vec<ServiceCheck>,
}

impl SystemdRequirement {
    pub fn parse(at: &str, value: &Value) -> Result<Self, DefinitionError> {
        let mut services = Vec::new();
        match value {
            Value::Mapping(m) => {
                for (k, v) in m {
                    let Some(name) = k.as_str() else {
                        return Err(DefinitionError::invalid(at, "service names must be strings"));
                    };
                    services.push(parse_check(at, name, v)?);
                }
            }
            other => {
                if let Some(name) = scalar_string(other) {
                    services.push(ServiceCheck {
                        name,
                        expected: None,
                        op: None,
                        started_after: None,
                    });
                } else if let Value::Sequence(items) = other {
                    for item in items {
                        let name = scalar_string(item).ok_or_else(|| {
                            DefinitionError::invalid(at, "service names must be strings")
                        })?;
                        services.push(ServiceCheck {
                            name,
                            expected: None,
                            op: None,
                            started_after: None,
                        });
                    }
                } else {
                    return Err(DefinitionError::invalid(
                        at,
                        "'systemd' takes a service name, list or mapping",
                    ));
                }
            }
        }
        if services.is_empty() {
            return Err(DefinitionError::invalid(at, "'systemd' names no services"));
        }
        Ok(Self { services })
    }

    pub fn evaluate(&self, ctx: &RunContext, cache: &mut PropertyCache) -> Result<bool, EvalError> {
        let mut summaries = Vec::new();
        let mut passed = true;
        for check in &self.services {
            let service = ctx.services().service(&check.name);
            match &service {
                Some(s) => summaries.push(s.summary()),
                None => summaries.push(format!("{}=unknown", check.name)),
            }
            if !check_one(ctx, check, service.as_ref()) {
                passed = false;
                break;
            }
        }
        cache.put("services", summaries.join(", "));
        Ok(passed)
    }
}

fn parse_check(at: &str, name: &str, value: &Value) -> Result<ServiceCheck, DefinitionError> {
    match value {
        Value::Null => Ok(ServiceCheck {
            name: name.to_string(),
            expected: None,
            op: None,
            started_after: None,
        }),
        Value::Mapping(m) => {
            let expected = match m.get("state") {
                Some(v) => Some(scalar_string(v).ok_or_else(|| {
                    DefinitionError::invalid(at, "'state' must be a string")
                })?),
                None => None,
            };
            let op_name = match m.get("op") {
                Some(v) => scalar_string(v)
                    .ok_or_else(|| DefinitionError::invalid(at, "'op' must be a string"))?,
                None => "eq".to_string(),
            };
            let op = match &expected {
                Some(state) => Some(OpChain::single(at, &op_name, Value::String(state.clone()))?),
                None if m.get("op").is_some() => {
                    return Err(DefinitionError::invalid(at, "'op' without a 'state'"));
                }
                None => None,
            };
            let started_after = match m.get("started-after") {
                Some(v) => Some(scalar_string(v).ok_or_else(|| {
                    DefinitionError::invalid(at, "'started-after' must be a service name")
                })?),
                None => None,
            };
            Ok(ServiceCheck {
                name: name.to_string(),
                expected,
                op,
                started_after,
            })
        }
        other => {
            // shorthand: name -> expected state
            let state = scalar_string(other).ok_or_else(|| {
                DefinitionError::invalid(at, "expected a state string or mapping")
            })?;
            Ok(ServiceCheck {
                name: name.to_string(),
                expected: Some(state.clone()),
                op: Some(OpChain::single(at, "eq", Value::String(state))?),
                started_after: None,
            })
        }
    }
}

fn check_one(
    ctx: &RunContext,
    check: &ServiceCheck,
    service: Option<&crate::facts::services::ServiceState>,
) -> bool {
    let Some(service) = service else {
        debug!("service '{}' not found", check.name);
        return false;
    };

    if let (Some(expected), Some(op)) = (&check.expected, &check.op) {
        let observed = service.observed_for(expected).unwrap_or("unknown");
        if !op.apply(&Value::String(observed.to_string())) {
            debug!(
                "service '{}' state '{}' does not satisfy expected '{}'",
                check.name, observed, expected
            );
            return false;
        }
    }

    if let Some(other) = &check.started_after {
        let reference = ctx.services().service(other).and_then(|r| r.start_time);
        if !started_after_ok(service.start_time, reference) {
            debug!(
                "service '{}' did not start late enough after '{}'",
                check.name, other
            );
            return false;
        }
    }

    true
}

/// With both start times known, the candidate must have started at least
/// the grace gap after the reference. An unknown time on either side
/// cannot prove an ordering violation, so it passes.
fn started_after_ok(candidate: Option<DateTime<Utc>>, reference: Option<DateTime<Utc>>) -> bool {
    match (candidate, reference) {
        (Some(c), Some(r)) => {
            c.signed_duration_since(r) >= Duration::seconds(STARTED_AFTER_GRACE_SECS)
        }
        _ => true,
    }
}
