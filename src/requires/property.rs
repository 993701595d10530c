//! property requirement: assertions over registered fact resolvers

use serde_yaml::Value;

use crate::context::RunContext;
use crate::error::{DefinitionError, EvalError};
use crate::props::cache::PropertyCache;
use crate::props::scalar_string;
use crate::requires::ops::OpChain;

/// Resolves a dotted property path through the RunContext registry and
/// applies an op-chain to the value (plain truthiness by default).
#[derive(Debug)]
pub struct PropertyRequirement {
    path: String,
    ops: OpChain,
}

impl PropertyRequirement {
    /// The path is resolved against the registry here, at load time, so
    /// a typo fails before any evaluation starts.
    pub fn parse(at: &str, value: &Value, ctx: &RunContext) -> Result<Self, DefinitionError> {
        let (path, ops) = match value {
            Value::Mapping(m) => {
                let path = m
                    .get("path")
                    .and_then(scalar_string)
                    .ok_or_else(|| DefinitionError::invalid(at, "'property' needs a 'path'"))?;
                let ops = match m.get("ops") {
                    Some(v) => OpChain::parse(at, v)?,
                    None => OpChain::truthiness(),
                };
                (path, ops)
            }
            other => {
                let path = scalar_string(other).ok_or_else(|| {
                    DefinitionError::invalid(at, "'property' takes a dotted path")
                })?;
                (path, OpChain::truthiness())
            }
        };
        if !ctx.properties().contains(&path) {
            return Err(DefinitionError::UnknownProperty(path));
        }
        Ok(Self { path, ops })
    }

    pub fn evaluate(&self, ctx: &RunContext, cache: &mut PropertyCache) -> Result<bool, EvalError> {
        let value = ctx
            .properties()
            .resolve(&self.path, ctx)
            .unwrap_or(Value::Null);
        cache.put("path", self.path.as_str());
        cache.put(
            "value",
            scalar_string(&value).unwrap_or_else(|| "unset".to_string()),
        );
        cache.put("ops", self.ops.describe());
        Ok(self.ops.apply(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(ctx: &RunContext, yaml: &str) -> Result<PropertyRequirement, DefinitionError> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        PropertyRequirement::parse("t", &value, ctx)
    }

    #[test]
    fn test_default_truthiness() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path())
            .with_property("openstack.release", |_ctx| Some(Value::String("ussuri".into())));
        let r = parse(&ctx, "openstack.release").unwrap();
        let mut cache = PropertyCache::new();
        assert!(r.evaluate(&ctx, &mut cache).unwrap());
        assert_eq!(cache.get("value").unwrap().to_string(), "ussuri");
    }

    #[test]
    fn test_explicit_ops() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path())
            .with_property("sysinfo.num_cpus", |_ctx| Some(Value::Number(2.into())));
        let r = parse(&ctx, "{path: sysinfo.num_cpus, ops: [[ge, 4]]}").unwrap();
        let mut cache = PropertyCache::new();
        assert!(!r.evaluate(&ctx, &mut cache).unwrap());
    }

    #[test]
    fn test_unknown_path_fails_at_parse() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path());
        let err = parse(&ctx, "no.such.thing").unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownProperty(_)));
    }

    #[test]
    fn test_unresolved_value_is_falsy() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path()).with_property("maybe.there", |_ctx| None);
        let r = parse(&ctx, "maybe.there").unwrap();
        let mut cache = PropertyCache::new();
        assert!(!r.evaluate(&ctx, &mut cache).unwrap());
    }
}
