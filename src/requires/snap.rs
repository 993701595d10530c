//! snap package requirement

use log::debug;
use serde_yaml::Value;

use crate::context::RunContext;
use crate::error::{DefinitionError, EvalError};
use crate::props::cache::PropertyCache;
use crate::props::string_list;

/// Passes when every listed snap is installed.
#[derive(Debug)]
pub struct SnapRequirement {
    snaps: Vec<String>,
}

impl SnapRequirement {
    pub fn parse(at: &str, value: &Value) -> Result<Self, DefinitionError> {
        let snaps = string_list(at, value)?;
        if snaps.is_empty() {
            return Err(DefinitionError::invalid(at, "'snap' names no snaps"));
        }
        Ok(Self { snaps })
    }

    pub fn evaluate(&self, ctx: &RunContext, cache: &mut PropertyCache) -> Result<bool, EvalError> {
        for name in &self.snaps {
            if !ctx.snaps().has_snap(name) {
                debug!("snap '{name}' not installed");
                return Ok(false);
            }
            cache.put("snap", name.as_str());
        }
        Ok(true)
    }
}
