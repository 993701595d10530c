//! Checks: the evaluatable conditions a scenario's conclusions combine
//!
//! A check is search-backed (an expression matched against an input
//! source) or requirement-backed. Its boolean result is memoized on
//! first access; asking again never re-runs the search filtering or the
//! requirement evaluation.

use std::path::PathBuf;

use log::debug;
use once_cell::unsync::OnceCell;
use serde_yaml::Value;

use crate::context::RunContext;
use crate::defs::{DefTree, NodeId};
use crate::error::{DefinitionError, EvalError};
use crate::props::cache::PropertyCache;
use crate::props::{scalar_string, ExprProperty, InputProperty};
use crate::requires::RequirementTree;
use crate::scenario::params::CheckParameters;
use crate::search::{FileSearcher, SearchCatalog, SearchDef};

enum CheckKind {
    Search {
        tag: String,
        cache: OnceCell<PropertyCache>,
        first_match: OnceCell<Vec<Option<String>>>,
    },
    Requires {
        tree: RequirementTree,
        cache: OnceCell<PropertyCache>,
    },
}

pub struct Check {
    name: String,
    at: String,
    kind: CheckKind,
    params: CheckParameters,
    result: OnceCell<bool>,
}

impl Check {
    /// Parse one `checks:` entry. `input`, `hint` and `check-parameters`
    /// fall back to the owning section's (possibly inherited) overrides;
    /// `expr` and `requires` are check-local. Search-backed checks
    /// register their term with the group's shared searcher here.
    pub fn parse(
        tree: &DefTree,
        leaf: NodeId,
        name: &str,
        body: &Value,
        ctx: &RunContext,
        searcher: &mut FileSearcher,
    ) -> Result<Self, EvalError> {
        let at = format!("{}.checks.{}", tree.path(leaf), name);
        let Value::Mapping(m) = body else {
            return Err(DefinitionError::invalid(&at, "a check must be a mapping").into());
        };

        let params = match m.get("check-parameters").or_else(|| tree.resolved(leaf, "check-parameters")) {
            Some(v) => CheckParameters::parse(&at, v)?,
            None => CheckParameters::default(),
        };

        let kind = match (m.get("expr"), m.get("requires")) {
            (Some(_), Some(_)) => {
                return Err(DefinitionError::invalid(
                    &at,
                    "a check takes 'expr' or 'requires', not both",
                )
                .into());
            }
            (Some(raw), None) => {
                let hint = m
                    .get("hint")
                    .or_else(|| tree.resolved(leaf, "hint"))
                    .and_then(scalar_string);
                let expr = ExprProperty::parse(&at, raw)?.or_hint(hint);

                let input_raw = m
                    .get("input")
                    .or_else(|| tree.resolved(leaf, "input"))
                    .ok_or_else(|| {
                        DefinitionError::invalid(&at, "a search check needs an 'input'")
                    })?;
                let input = InputProperty::parse(&at, input_raw, ctx)?;

                let tag = at.clone();
                let def = SearchDef::new(&tag, expr.patterns(), expr.hint())?;
                let sources: Vec<PathBuf> = input.sources(ctx)?.to_vec();
                for source in &sources {
                    searcher.add(&def, source);
                }

                CheckKind::Search {
                    tag,
                    cache: OnceCell::new(),
                    first_match: OnceCell::new(),
                }
            }
            (None, Some(raw)) => CheckKind::Requires {
                tree: RequirementTree::parse(&at, raw, ctx)?,
                cache: OnceCell::new(),
            },
            (None, None) => {
                return Err(DefinitionError::invalid(
                    &at,
                    "a check needs an 'expr' or a 'requires'",
                )
                .into());
            }
        };

        Ok(Self {
            name: name.to_string(),
            at,
            kind,
            params,
            result: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Memoized boolean result, computed at most once per run.
    pub fn result(&self, ctx: &RunContext, catalog: &SearchCatalog) -> Result<bool, EvalError> {
        self.result
            .get_or_try_init(|| self.evaluate(ctx, catalog))
            .copied()
    }

    /// The already-computed result, if any.
    pub(crate) fn memoized(&self) -> Option<bool> {
        self.result.get().copied()
    }

    fn evaluate(&self, ctx: &RunContext, catalog: &SearchCatalog) -> Result<bool, EvalError> {
        match &self.kind {
            CheckKind::Search {
                tag,
                cache,
                first_match,
            } => {
                let results = catalog.by_tag(tag);

                let mut populated = PropertyCache::new();
                populated.put("num_results", results.len());
                for result in &results {
                    for (index, group) in result.groups().iter().enumerate() {
                        if let Some(value) = group {
                            populated.add_to_set(&format!("results_group_{}", index + 1), value);
                        }
                    }
                }
                let _ = cache.set(populated);
                if let Some(first) = results.first() {
                    let _ = first_match.set(first.groups().to_vec());
                }

                let passed = self.params.satisfied(&results, ctx.now());
                debug!(
                    "check '{}': {} match(es), {}",
                    self.at,
                    results.len(),
                    if passed { "passed" } else { "failed" }
                );
                Ok(passed)
            }
            CheckKind::Requires { tree, cache } => {
                let mut populated = PropertyCache::new();
                let passed = tree.evaluate(ctx, &mut populated)?;
                let _ = cache.set(populated);
                debug!(
                    "check '{}': requirements {}",
                    self.at,
                    if passed { "passed" } else { "failed" }
                );
                Ok(passed)
            }
        }
    }

    /// This check's cache for one of its properties, for `@`-references.
    pub(crate) fn cache(&self, property: &str) -> Option<&PropertyCache> {
        match (&self.kind, property) {
            (CheckKind::Search { cache, .. }, "expr") => cache.get(),
            (CheckKind::Requires { cache, .. }, "requires") => cache.get(),
            _ => None,
        }
    }

    /// Captured groups of the first match, for positional format-groups.
    pub(crate) fn first_match_groups(&self) -> Option<&[Option<String>]> {
        match &self.kind {
            CheckKind::Search { first_match, .. } => first_match.get().map(Vec::as_slice),
            CheckKind::Requires { .. } => None,
        }
    }

    pub(crate) fn is_search(&self) -> bool {
        matches!(self.kind, CheckKind::Search { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn scenario_tree(yaml: &str) -> DefTree {
        let content: Value = serde_yaml::from_str(yaml).unwrap();
        DefTree::build("scenarios.test", &content).unwrap()
    }

    fn check_from(
        tree: &DefTree,
        ctx: &RunContext,
        searcher: &mut FileSearcher,
        name: &str,
    ) -> Check {
        let leaf = tree.leaf_sections()[0];
        let checks = tree.resolved(leaf, "checks").unwrap().as_mapping().unwrap();
        let body = checks.get(name).unwrap();
        Check::parse(tree, leaf, name, body, ctx, searcher).unwrap()
    }

    #[test]
    fn test_search_check_populates_expr_cache() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("var/log")).unwrap();
        fs::write(
            tmp.path().join("var/log/app.log"),
            "osd.10 is slow\nosd.20 is slow\nosd.10 is slow\n",
        )
        .unwrap();
        let ctx = RunContext::new(tmp.path());

        let tree = scenario_tree(
            "scn:\n\
             \x20 input:\n\
             \x20   path: var/log/app.log\n\
             \x20 checks:\n\
             \x20   slow:\n\
             \x20     expr: 'osd\\.(\\d+) is slow'\n\
             \x20 conclusions: {}\n",
        );
        let mut searcher = FileSearcher::new();
        let check = check_from(&tree, &ctx, &mut searcher, "slow");
        let catalog = searcher.search();

        assert!(check.result(&ctx, &catalog).unwrap());
        let cache = check.cache("expr").unwrap();
        assert_eq!(cache.get("num_results").unwrap().to_string(), "3");
        // distinct values only, first-seen order
        assert_eq!(cache.get("results_group_1").unwrap().to_string(), "10, 20");
        assert_eq!(check.first_match_groups().unwrap(), &[Some("10".to_string())]);
    }

    #[test]
    fn test_requires_check_memoized() {
        let tmp = TempDir::new().unwrap();
        let calls = Rc::new(Cell::new(0usize));
        let seen = Rc::clone(&calls);
        let ctx = RunContext::new(tmp.path()).with_property("counted.flag", move |_ctx| {
            seen.set(seen.get() + 1);
            Some(Value::Bool(true))
        });

        let tree = scenario_tree(
            "scn:\n\
             \x20 checks:\n\
             \x20   gated:\n\
             \x20     requires:\n\
             \x20       property: counted.flag\n\
             \x20 conclusions: {}\n",
        );
        let mut searcher = FileSearcher::new();
        let check = check_from(&tree, &ctx, &mut searcher, "gated");
        let catalog = searcher.search();

        assert!(check.result(&ctx, &catalog).unwrap());
        assert!(check.result(&ctx, &catalog).unwrap());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_min_results_parameter() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "ERROR\nERROR\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        let tree = scenario_tree(
            "scn:\n\
             \x20 input:\n\
             \x20   path: app.log\n\
             \x20 checks:\n\
             \x20   noisy:\n\
             \x20     expr: ERROR\n\
             \x20     check-parameters:\n\
             \x20       min-results: 3\n\
             \x20 conclusions: {}\n",
        );
        let mut searcher = FileSearcher::new();
        let check = check_from(&tree, &ctx, &mut searcher, "noisy");
        let catalog = searcher.search();
        assert!(!check.result(&ctx, &catalog).unwrap());
    }

    #[test]
    fn test_expr_and_requires_exclusive() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path());
        let tree = scenario_tree(
            "scn:\n\
             \x20 input:\n\
             \x20   path: app.log\n\
             \x20 checks:\n\
             \x20   bad:\n\
             \x20     expr: x\n\
             \x20     requires:\n\
             \x20       snap: lxd\n\
             \x20 conclusions: {}\n",
        );
        let leaf = tree.leaf_sections()[0];
        let checks = tree.resolved(leaf, "checks").unwrap().as_mapping().unwrap();
        let body = checks.get("bad").unwrap();
        let mut searcher = FileSearcher::new();
        assert!(Check::parse(&tree, leaf, "bad", body, &ctx, &mut searcher).is_err());
    }

    #[test]
    fn test_search_check_without_input_fails() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path());
        let tree = scenario_tree(
            "scn:\n\
             \x20 checks:\n\
             \x20   orphan:\n\
             \x20     expr: x\n\
             \x20 conclusions: {}\n",
        );
        let leaf = tree.leaf_sections()[0];
        let checks = tree.resolved(leaf, "checks").unwrap().as_mapping().unwrap();
        let body = checks.get("orphan").unwrap();
        let mut searcher = FileSearcher::new();
        assert!(Check::parse(&tree, leaf, "orphan", body, &ctx, &mut searcher).is_err());
    }
}
