//! Property registry
//!
//! `property:` requirements name a dotted path such as `kernel.version`.
//! Paths resolve through this registry to statically registered closures
//! over the run context, so an invalid path is caught when the rule loads
//! rather than in the middle of an evaluation.

use crate::context::RunContext;
use serde_yaml::Value;
use std::collections::HashMap;
use std::fs;

/// Resolver for one property path.
pub type PropertyResolver = Box<dyn Fn(&RunContext) -> Option<Value>>;

/// Registry of dotted property paths.
pub struct PropertyRegistry {
    resolvers: HashMap<String, PropertyResolver>,
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        let mut registry = Self {
            resolvers: HashMap::new(),
        };

        registry.register("kernel.version", |ctx| {
            // "Linux version 5.4.0-122-generic (...)"
            let content = fs::read_to_string(ctx.data_root().join("proc/version")).ok()?;
            content
                .split_whitespace()
                .nth(2)
                .map(|v| Value::String(v.to_string()))
        });

        registry.register("kernel.cmdline", |ctx| {
            let content = fs::read_to_string(ctx.data_root().join("proc/cmdline")).ok()?;
            Some(Value::String(content.trim().to_string()))
        });

        registry.register("platform.hostname", |ctx| {
            let content = fs::read_to_string(ctx.data_root().join("hostname")).ok()?;
            Some(Value::String(content.trim().to_string()))
        });

        registry.register("sysinfo.num_cpus", |ctx| {
            let content = fs::read_to_string(ctx.data_root().join("proc/cpuinfo")).ok()?;
            let count = content
                .lines()
                .filter(|l| l.starts_with("processor"))
                .count();
            Some(Value::Number(count.into()))
        });

        registry
    }
}

impl PropertyRegistry {
    pub fn register<F>(&mut self, path: &str, resolver: F)
    where
        F: Fn(&RunContext) -> Option<Value> + 'static,
    {
        self.resolvers.insert(path.to_string(), Box::new(resolver));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resolvers.contains_key(path)
    }

    pub fn resolve(&self, path: &str, ctx: &RunContext) -> Option<Value> {
        self.resolvers.get(path).and_then(|r| r(ctx))
    }
}
