//! apt package requirement

use log::debug;
use serde_yaml::Value;

use crate::context::RunContext;
use crate::error::{DefinitionError, EvalError};
use crate::facts::version::DpkgVersion;
use crate::props::cache::PropertyCache;
use crate::props::{scalar_string, string_list};

/// Inclusive version range; either side may be open.
#[derive(Debug)]
struct VersionRange {
    min: Option<DpkgVersion>,
    max: Option<DpkgVersion>,
}

impl VersionRange {
    fn contains(&self, version: &DpkgVersion) -> bool {
        if let Some(min) = &self.min {
            if version < min {
                return false;
            }
        }
        if let Some(max) = &self.max {
            if version > max {
                return false;
            }
        }
        true
    }
}

/// Passes when every listed package is installed and, where ranges are
/// given, its version lies inside at least one range. Versions compare
/// with dpkg ordering, never lexically. Bails on the first failing
/// package.
#[derive(Debug)]
pub struct AptRequirement {
    packages: Vec<(String, Vec<VersionRange>)>,
}

impl AptRequirement {
    pub fn parse(at: &str, value: &Value) -> Result<Self, DefinitionError> {
        let mut packages = Vec::new();
        match value {
            Value::Mapping(m) => {
                for (k, ranges) in m {
                    let Some(name) = k.as_str() else {
                        return Err(DefinitionError::invalid(at, "package names must be strings"));
                    };
                    packages.push((name.to_string(), parse_ranges(at, ranges)?));
                }
            }
            other => {
                for name in string_list(at, other)? {
                    packages.push((name, Vec::new()));
                }
            }
        }
        if packages.is_empty() {
            return Err(DefinitionError::invalid(at, "'apt' names no packages"));
        }
        Ok(Self { packages })
    }

    pub fn evaluate(&self, ctx: &RunContext, cache: &mut PropertyCache) -> Result<bool, EvalError> {
        for (name, ranges) in &self.packages {
            let Some(version) = ctx.packages().installed_version(name) else {
                debug!("package '{name}' not installed");
                return Ok(false);
            };
            cache.put("package", format!("{name}={version}"));
            cache.put("version", version.to_string());
            if !ranges.is_empty() && !ranges.iter().any(|r| r.contains(&version)) {
                debug!("package '{name}' version {version} outside every allowed range");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn parse_ranges(at: &str, value: &Value) -> Result<Vec<VersionRange>, DefinitionError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items.iter().map(|item| parse_range(at, item)).collect(),
        _ => Err(DefinitionError::invalid(
            at,
            "package ranges must be a list of {min, max} mappings",
        )),
    }
}

fn parse_range(at: &str, value: &Value) -> Result<VersionRange, DefinitionError> {
    let Value::Mapping(m) = value else {
        return Err(DefinitionError::invalid(at, "a range is a {min, max} mapping"));
    };
    let min = match m.get("min") {
        Some(v) => Some(parse_version(at, v)?),
        None => None,
    };
    let max = match m.get("max") {
        Some(v) => Some(parse_version(at, v)?),
        None => None,
    };
    if min.is_none() && max.is_none() {
        return Err(DefinitionError::invalid(at, "a range needs 'min' or 'max'"));
    }
    Ok(VersionRange { min, max })
}

fn parse_version(at: &str, value: &Value) -> Result<DpkgVersion, DefinitionError> {
    let raw = scalar_string(value)
        .ok_or_else(|| DefinitionError::invalid(at, "versions must be scalar"))?;
    DpkgVersion::parse(&raw).map_err(|reason| DefinitionError::invalid(at, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::PackageFacts;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct FakePackages(HashMap<String, String>);

    impl FakePackages {
        fn with(pairs: &[(&str, &str)]) -> Box<Self> {
            Box::new(Self(
                pairs
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.to_string()))
                    .collect(),
            ))
        }
    }

    impl PackageFacts for FakePackages {
        fn installed_version(&self, name: &str) -> Option<DpkgVersion> {
            self.0.get(name).map(|v| DpkgVersion::parse(v).unwrap())
        }
    }

    fn req(yaml: &str) -> AptRequirement {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        AptRequirement::parse("t", &value).unwrap()
    }

    fn ctx_with(tmp: &TempDir, pairs: &[(&str, &str)]) -> RunContext {
        RunContext::new(tmp.path()).with_packages(FakePackages::with(pairs))
    }

    #[test]
    fn test_installed_without_ranges() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx_with(&tmp, &[("nova-compute", "2:21.2.4-0ubuntu1")]);
        let mut cache = PropertyCache::new();
        assert!(req("nova-compute").evaluate(&ctx, &mut cache).unwrap());
        assert_eq!(
            cache.get("package").unwrap().to_string(),
            "nova-compute=2:21.2.4-0ubuntu1"
        );
    }

    #[test]
    fn test_not_installed_fails() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx_with(&tmp, &[]);
        let mut cache = PropertyCache::new();
        assert!(!req("nova-compute").evaluate(&ctx, &mut cache).unwrap());
    }

    #[test]
    fn test_range_boundaries_inclusive() {
        let tmp = TempDir::new().unwrap();
        let r = req("{ceph-osd: [{min: '15.2.0', max: '15.2.17'}]}");

        for version in ["15.2.0", "15.2.9", "15.2.17"] {
            let ctx = ctx_with(&tmp, &[("ceph-osd", version)]);
            let mut cache = PropertyCache::new();
            assert!(
                r.evaluate(&ctx, &mut cache).unwrap(),
                "{version} should be inside the range"
            );
        }
        for version in ["15.1.9", "15.2.18"] {
            let ctx = ctx_with(&tmp, &[("ceph-osd", version)]);
            let mut cache = PropertyCache::new();
            assert!(
                !r.evaluate(&ctx, &mut cache).unwrap(),
                "{version} should be outside the range"
            );
        }
    }

    #[test]
    fn test_dpkg_ordering_not_lexical() {
        // lexically "2:..." < "10.0" is false on the epoch digit alone
        let tmp = TempDir::new().unwrap();
        let ctx = ctx_with(&tmp, &[("pkg", "10.0")]);
        let mut cache = PropertyCache::new();
        assert!(req("{pkg: [{min: '9.0'}]}")
            .evaluate(&ctx, &mut cache)
            .unwrap());
    }

    #[test]
    fn test_any_range_may_match() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx_with(&tmp, &[("pkg", "3.5")]);
        let mut cache = PropertyCache::new();
        let r = req("{pkg: [{min: '1.0', max: '2.0'}, {min: '3.0', max: '4.0'}]}");
        assert!(r.evaluate(&ctx, &mut cache).unwrap());
    }

    #[test]
    fn test_multiple_packages_bail_on_first_failure() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx_with(&tmp, &[("second", "1.0")]);
        let mut cache = PropertyCache::new();
        assert!(!req("[first, second]").evaluate(&ctx, &mut cache).unwrap());
        // bailed before 'second' was consulted
        assert!(cache.get("package").is_none());
    }
}
