//! Known-bug rules
//!
//! A bug leaf pairs an optional `requires` gate with an optional search
//! expression and a `raises` block that defaults to the known-bug kind.
//! A leaf with an expression raises when the search matches; a leaf
//! without one raises purely on its gate passing, which covers bugs
//! identifiable from installed package versions alone. Every bug id
//! yields at most one finding per run.

use std::collections::HashSet;

use log::debug;
use once_cell::unsync::OnceCell;

use crate::context::RunContext;
use crate::defs::{DefTree, NodeId};
use crate::error::{DefinitionError, EvalError};
use crate::issues::IssueSink;
use crate::props::{
    scalar_string, CacheSource, ExprProperty, InputProperty, PropertyCache, RaisesProperty,
};
use crate::requires::RequiresProperty;
use crate::search::{FileSearcher, SearchCatalog, SearchDef};

struct Bug {
    id: String,
    origin: String,
    tag: Option<String>,
    raises: RaisesProperty,
    gate_cache: PropertyCache,
    expr_cache: OnceCell<PropertyCache>,
}

impl CacheSource for Bug {
    fn cache_of(&self, _check: Option<&str>, property: &str) -> Option<&PropertyCache> {
        match property {
            "expr" => self.expr_cache.get(),
            "requires" => Some(&self.gate_cache),
            _ => None,
        }
    }
}

/// Loads bug definitions for one rule group, runs the shared search and
/// raises one known-bug finding per matched id.
pub struct BugChecker<'ctx> {
    ctx: &'ctx RunContext,
}

impl<'ctx> BugChecker<'ctx> {
    pub fn new(ctx: &'ctx RunContext) -> Self {
        Self { ctx }
    }

    /// Returns the number of findings raised.
    pub fn run(&self, tree: &DefTree, sink: &IssueSink) -> Result<usize, EvalError> {
        let mut searcher = FileSearcher::new();
        let mut pending = Vec::new();
        let mut raised = HashSet::new();
        let mut count = 0;

        for leaf in tree.leaf_sections() {
            match self.load_bug(tree, leaf, &mut searcher)? {
                Some(bug) if bug.tag.is_some() => pending.push(bug),
                // no search expression: the gate alone decides
                Some(bug) => {
                    count += raise(&bug, &[], sink, &mut raised);
                }
                None => {}
            }
        }

        let catalog = searcher.search();
        for bug in &pending {
            let tag = bug.tag.as_deref().unwrap_or_default();
            let results = catalog.by_tag(tag);
            if results.is_empty() {
                continue;
            }
            let _ = bug.expr_cache.set(expr_cache(&results));
            let groups = if bug.raises.has_format_groups() {
                results[0].groups().to_vec()
            } else {
                Vec::new()
            };
            count += raise(bug, &groups, sink, &mut raised);
        }
        Ok(count)
    }

    /// Parse one bug leaf. Returns `Ok(None)` when its gate fails.
    fn load_bug(
        &self,
        tree: &DefTree,
        leaf: NodeId,
        searcher: &mut FileSearcher,
    ) -> Result<Option<Bug>, EvalError> {
        let at = tree.path(leaf);
        let node = tree.node(leaf);

        let mut gate_cache = PropertyCache::new();
        if let Some(raw) = tree.resolved(leaf, "requires") {
            let mut gate = RequiresProperty::parse(&at, raw, self.ctx)?;
            if !gate.evaluate(self.ctx)? {
                debug!("bug '{at}' gate failed, skipping");
                return Ok(None);
            }
            gate_cache = gate.cache().clone();
        }

        let raises_raw = node
            .override_raw("raises")
            .ok_or_else(|| DefinitionError::invalid(&at, "a bug needs a 'raises'"))?;
        let raises =
            RaisesProperty::parse_with_kind(&at, raises_raw, crate::issues::FindingKind::KnownBug)?;

        let tag = match node.override_raw("expr") {
            Some(raw) => {
                let input_raw = tree.resolved(leaf, "input").ok_or_else(|| {
                    DefinitionError::invalid(&at, "a bug with an 'expr' needs an 'input'")
                })?;
                let input = InputProperty::parse(&at, input_raw, self.ctx)?;
                let hint = tree.resolved(leaf, "hint").and_then(|v| scalar_string(v));
                let expr = ExprProperty::parse(&at, raw)?.or_hint(hint);
                let def = SearchDef::new(&at, expr.patterns(), expr.hint())?;
                for source in input.sources(self.ctx)? {
                    searcher.add(&def, source);
                }
                Some(at.clone())
            }
            None => None,
        };

        let id = raises
            .bug_id()
            .map(str::to_string)
            .unwrap_or_else(|| node.name.clone());

        Ok(Some(Bug {
            id,
            origin: at,
            tag,
            raises,
            gate_cache,
            expr_cache: OnceCell::new(),
        }))
    }
}

fn raise(
    bug: &Bug,
    groups: &[Option<String>],
    sink: &IssueSink,
    raised: &mut HashSet<String>,
) -> usize {
    if !raised.insert(bug.id.clone()) {
        return 0;
    }
    let message = bug.raises.message(bug, groups);
    sink.add(bug.raises.kind(), message, &bug.origin);
    1
}

/// Build the search-result cache that `@expr.<key>` references read.
fn expr_cache(results: &[&crate::search::SearchResult]) -> PropertyCache {
    let mut cache = PropertyCache::new();
    cache.put("num_results", results.len() as i64);
    for result in results {
        for (idx, group) in result.groups().iter().enumerate() {
            if let Some(value) = group {
                cache.add_to_set(&format!("results_group_{}", idx + 1), value);
            }
        }
    }
    cache
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::FindingKind;
    use serde_yaml::Value;
    use std::fs;
    use tempfile::TempDir;

    fn tree_from(yaml: &str) -> DefTree {
        let content: Value = serde_yaml::from_str(yaml).unwrap();
        DefTree::build("bugs.test", &content).unwrap()
    }

    #[test]
    fn test_matched_expr_raises_known_bug() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "assert failed in osd\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        let tree = tree_from(
            "lp1999081:\n\
             \x20 input: {path: app.log}\n\
             \x20 expr: assert failed in (\\w+)\n\
             \x20 raises:\n\
             \x20   bug-id: '1999081'\n\
             \x20   message: 'known assert in {}'\n\
             \x20   format-groups: [1]\n",
        );
        let sink = IssueSink::new();
        let raised = BugChecker::new(&ctx).run(&tree, &sink).unwrap();
        assert_eq!(raised, 1);
        let findings = sink.findings();
        assert_eq!(findings[0].kind, FindingKind::KnownBug);
        assert_eq!(findings[0].message, "known assert in osd");
        assert_eq!(findings[0].origin, "bugs.test.lp1999081");
    }

    #[test]
    fn test_unmatched_expr_raises_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "all fine\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        let tree = tree_from(
            "lp1:\n\
             \x20 input: {path: app.log}\n\
             \x20 expr: assert failed\n\
             \x20 raises: {message: hit}\n",
        );
        let sink = IssueSink::new();
        assert_eq!(BugChecker::new(&ctx).run(&tree, &sink).unwrap(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_gate_only_bug_raises_on_pass() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path())
            .with_property("platform.affected", |_ctx| Some(Value::Bool(true)));

        let tree = tree_from(
            "lp2:\n\
             \x20 requires:\n\
             \x20   property: platform.affected\n\
             \x20 raises: {message: affected build}\n",
        );
        let sink = IssueSink::new();
        assert_eq!(BugChecker::new(&ctx).run(&tree, &sink).unwrap(), 1);
        assert_eq!(sink.findings()[0].kind, FindingKind::KnownBug);
    }

    #[test]
    fn test_failed_gate_skips_bug() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path())
            .with_property("platform.affected", |_ctx| Some(Value::Bool(false)));

        let tree = tree_from(
            "lp3:\n\
             \x20 requires:\n\
             \x20   property: platform.affected\n\
             \x20 raises: {message: affected build}\n",
        );
        let sink = IssueSink::new();
        assert_eq!(BugChecker::new(&ctx).run(&tree, &sink).unwrap(), 0);
    }

    #[test]
    fn test_one_finding_per_bug_id() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "crash here\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        // two leaves sharing a bug id, both matching
        let tree = tree_from(
            "variant-a:\n\
             \x20 input: {path: app.log}\n\
             \x20 expr: crash\n\
             \x20 raises: {bug-id: '77', message: bug 77}\n\
             variant-b:\n\
             \x20 input: {path: app.log}\n\
             \x20 expr: here\n\
             \x20 raises: {bug-id: '77', message: bug 77}\n",
        );
        let sink = IssueSink::new();
        assert_eq!(BugChecker::new(&ctx).run(&tree, &sink).unwrap(), 1);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_format_dict_reads_expr_cache() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "leak of 12 MB\nleak of 40 MB\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        let tree = tree_from(
            "lp4:\n\
             \x20 input: {path: app.log}\n\
             \x20 expr: leak of (\\d+) MB\n\
             \x20 raises:\n\
             \x20   message: '{n} leaks seen, sizes {sizes}'\n\
             \x20   format-dict:\n\
             \x20     n: '@expr.num_results'\n\
             \x20     sizes: '@expr.results_group_1:comma_join'\n",
        );
        let sink = IssueSink::new();
        BugChecker::new(&ctx).run(&tree, &sink).unwrap();
        assert_eq!(sink.findings()[0].message, "2 leaks seen, sizes 12, 40");
    }

    #[test]
    fn test_bug_without_raises_is_invalid() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "x\n").unwrap();
        let ctx = RunContext::new(tmp.path());
        let tree = tree_from("lp5:\n  input: {path: app.log}\n  expr: x\n");
        let sink = IssueSink::new();
        assert!(BugChecker::new(&ctx).run(&tree, &sink).is_err());
    }
}
