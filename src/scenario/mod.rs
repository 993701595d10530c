//! Scenario evaluation: checks combined into prioritized conclusions
//!
//! A scenario is one leaf definition carrying `checks:` and
//! `conclusions:`. Evaluation is strictly two-phase: loading parses both
//! collections and registers every search term with the group's shared
//! searcher (a scenario whose own `requires` gate fails is never loaded
//! at all); running evaluates every conclusion against memoized check
//! results after one shared search pass, and emits at most one finding
//! per scenario, from the highest-priority reached conclusion.

pub mod check;
pub mod conclusion;
pub mod params;

pub use check::Check;
pub use conclusion::Conclusion;
pub use params::CheckParameters;

use log::{debug, error};

use crate::context::RunContext;
use crate::defs::{DefTree, NodeId};
use crate::error::{DefinitionError, EvalError};
use crate::issues::IssueSink;
use crate::props::cache::{CacheSource, PropertyCache};
use crate::props::DecisionProperty;
use crate::requires::RequiresProperty;
use crate::search::{FileSearcher, SearchCatalog};

pub struct Scenario {
    origin: String,
    checks: Vec<Check>,
    conclusions: Vec<Conclusion>,
}

impl Scenario {
    /// Load one scenario leaf. Returns `Ok(None)` when the scenario's
    /// `requires` gate fails; the scenario is then skipped before any
    /// check is parsed or registered.
    pub fn load(
        tree: &DefTree,
        leaf: NodeId,
        ctx: &RunContext,
        searcher: &mut FileSearcher,
    ) -> Result<Option<Self>, EvalError> {
        let origin = tree.path(leaf);

        if let Some(raw) = tree.resolved(leaf, "requires") {
            let mut gate = RequiresProperty::parse(&origin, raw, ctx)?;
            if !gate.evaluate(ctx)? {
                debug!("scenario '{origin}' gate failed, skipping");
                return Ok(None);
            }
        }

        let checks_raw = tree
            .resolved(leaf, "checks")
            .and_then(|v| v.as_mapping())
            .ok_or_else(|| {
                DefinitionError::invalid(&origin, "a scenario needs a 'checks' mapping")
            })?;
        let mut checks = Vec::with_capacity(checks_raw.len());
        for (k, body) in checks_raw {
            let Some(name) = k.as_str() else {
                return Err(DefinitionError::invalid(&origin, "check names must be strings").into());
            };
            checks.push(Check::parse(tree, leaf, name, body, ctx, searcher)?);
        }

        let conclusions_raw = tree
            .resolved(leaf, "conclusions")
            .and_then(|v| v.as_mapping())
            .ok_or_else(|| {
                DefinitionError::invalid(&origin, "a scenario needs a 'conclusions' mapping")
            })?;
        let at = format!("{origin}.conclusions");
        let mut conclusions = Vec::with_capacity(conclusions_raw.len());
        for (k, body) in conclusions_raw {
            let Some(name) = k.as_str() else {
                return Err(
                    DefinitionError::invalid(&at, "conclusion names must be strings").into()
                );
            };
            let conclusion = Conclusion::parse(&at, name, body)?;
            for check in conclusion.decision().check_names() {
                if !checks.iter().any(|c| c.name() == check) {
                    return Err(DefinitionError::UnknownCheck {
                        conclusion: name.to_string(),
                        check: check.to_string(),
                    }
                    .into());
                }
            }
            conclusions.push(conclusion);
        }

        Ok(Some(Self {
            origin,
            checks,
            conclusions,
        }))
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name() == name)
    }

    /// Evaluate every conclusion and emit the winner's finding, if any.
    /// Returns whether a finding was emitted.
    pub fn run(
        &self,
        ctx: &RunContext,
        catalog: &SearchCatalog,
        sink: &IssueSink,
    ) -> Result<bool, EvalError> {
        let mut winner: Option<&Conclusion> = None;
        for conclusion in &self.conclusions {
            // evaluate referenced checks first; each runs at most once
            // per run, memoized
            for name in conclusion.decision().check_names() {
                let check = self.check(name).ok_or_else(|| DefinitionError::UnknownCheck {
                    conclusion: conclusion.name().to_string(),
                    check: name.to_string(),
                })?;
                check.result(ctx, catalog)?;
            }
            let reached = conclusion
                .decision()
                .reached(&|name| self.check(name).and_then(Check::memoized).unwrap_or(false));
            if !reached {
                continue;
            }
            debug!(
                "scenario '{}': conclusion '{}' reached (priority {})",
                self.origin,
                conclusion.name(),
                conclusion.priority()
            );
            // strict greater-than keeps the first seen on ties
            if winner.map_or(true, |w| conclusion.priority() > w.priority()) {
                winner = Some(conclusion);
            }
        }

        let Some(conclusion) = winner else {
            return Ok(false);
        };
        let groups = self.trigger_groups(conclusion.decision());
        let message = conclusion.raises().message(self, &groups);
        sink.add(conclusion.raises().kind(), message, &self.origin);
        Ok(true)
    }

    /// Captured groups of the first match of the first passing
    /// search-backed check in the decision, for positional templates.
    fn trigger_groups(&self, decision: &DecisionProperty) -> Vec<Option<String>> {
        decision
            .check_names()
            .iter()
            .filter_map(|name| self.check(name))
            .find(|c| c.is_search() && c.memoized() == Some(true))
            .and_then(Check::first_match_groups)
            .map(<[Option<String>]>::to_vec)
            .unwrap_or_default()
    }
}

impl CacheSource for Scenario {
    fn cache_of(&self, check: Option<&str>, property: &str) -> Option<&PropertyCache> {
        self.check(check?)?.cache(property)
    }
}

/// Loads and runs every scenario of one rule group against a shared
/// search pass.
pub struct ScenarioRunner<'ctx> {
    ctx: &'ctx RunContext,
}

impl<'ctx> ScenarioRunner<'ctx> {
    pub fn new(ctx: &'ctx RunContext) -> Self {
        Self { ctx }
    }

    /// Run every scenario in the tree. Returns the number of findings
    /// emitted. An evaluation error is logged with its scenario context
    /// and propagated; it never turns into a finding.
    pub fn run(&self, tree: &DefTree, sink: &IssueSink) -> Result<usize, EvalError> {
        let mut searcher = FileSearcher::new();
        let mut scenarios = Vec::new();
        for leaf in tree.leaf_sections() {
            if let Some(scenario) = Scenario::load(tree, leaf, self.ctx, &mut searcher)? {
                scenarios.push(scenario);
            }
        }

        let catalog = searcher.search();

        let mut emitted = 0;
        for scenario in &scenarios {
            match scenario.run(self.ctx, &catalog, sink) {
                Ok(true) => emitted += 1,
                Ok(false) => {}
                Err(err) => {
                    error!("scenario '{}' failed: {err}", scenario.origin());
                    return Err(err);
                }
            }
        }
        Ok(emitted)
    }
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
        DefTree::build("scenarios.test", &content).unwrap()
    }

    fn run(ctx: &RunContext, yaml: &str) -> (usize, Vec<crate::issues::Finding>) {
        let tree = tree_from(yaml);
        let sink = IssueSink::new();
        let emitted = ScenarioRunner::new(ctx).run(&tree, &sink).unwrap();
        (emitted, sink.findings())
    }

    #[test]
    fn test_one_finding_per_scenario() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "ERROR boom\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        let (emitted, findings) = run(
            &ctx,
            "scn:\n\
             \x20 input:\n\
             \x20   path: app.log\n\
             \x20 checks:\n\
             \x20   has_errors:\n\
             \x20     expr: ERROR\n\
             \x20 conclusions:\n\
             \x20   errors-found:\n\
             \x20     decision: has_errors\n\
             \x20     raises:\n\
             \x20       message: errors in the log\n",
        );
        assert_eq!(emitted, 1);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "errors in the log");
        assert_eq!(findings[0].kind, FindingKind::PotentialIssue);
        assert_eq!(findings[0].origin, "scenarios.test.scn");
    }

    #[test]
    fn test_priority_wins_then_definition_order() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "ERROR\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        // both conclusions reached; priority 2 wins
        let (_, findings) = run(
            &ctx,
            "scn:\n\
             \x20 input:\n\
             \x20   path: app.log\n\
             \x20 checks:\n\
             \x20   c1:\n\
             \x20     expr: ERROR\n\
             \x20 conclusions:\n\
             \x20   low:\n\
             \x20     priority: 1\n\
             \x20     decision: c1\n\
             \x20     raises: {message: low wins}\n\
             \x20   high:\n\
             \x20     priority: 2\n\
             \x20     decision: c1\n\
             \x20     raises: {message: high wins}\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "high wins");

        // equal priority: the first defined wins
        let (_, findings) = run(
            &ctx,
            "scn:\n\
             \x20 input:\n\
             \x20   path: app.log\n\
             \x20 checks:\n\
             \x20   c1:\n\
             \x20     expr: ERROR\n\
             \x20 conclusions:\n\
             \x20   first:\n\
             \x20     decision: c1\n\
             \x20     raises: {message: first defined}\n\
             \x20   second:\n\
             \x20     decision: c1\n\
             \x20     raises: {message: second defined}\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "first defined");
    }

    #[test]
    fn test_failed_gate_skips_scenario() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "ERROR\n").unwrap();
        let ctx = RunContext::new(tmp.path())
            .with_property("platform.is-relevant", |_ctx| Some(Value::Bool(false)));

        let (emitted, findings) = run(
            &ctx,
            "scn:\n\
             \x20 input:\n\
             \x20   path: app.log\n\
             \x20 requires:\n\
             \x20   property: platform.is-relevant\n\
             \x20 checks:\n\
             \x20   c1:\n\
             \x20     expr: ERROR\n\
             \x20 conclusions:\n\
             \x20   hit:\n\
             \x20     decision: c1\n\
             \x20     raises: {message: never}\n",
        );
        assert_eq!(emitted, 0);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_unknown_check_in_decision_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path());
        let tree = tree_from(
            "scn:\n\
             \x20 input:\n\
             \x20   path: app.log\n\
             \x20 checks:\n\
             \x20   c1:\n\
             \x20     expr: ERROR\n\
             \x20 conclusions:\n\
             \x20   broken:\n\
             \x20     decision: no_such_check\n\
             \x20     raises: {message: x}\n",
        );
        let sink = IssueSink::new();
        let err = ScenarioRunner::new(&ctx).run(&tree, &sink).unwrap_err();
        assert!(err.to_string().contains("no_such_check"));
    }

    #[test]
    fn test_cache_reference_in_message() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("ceph.log"),
            "osd.10 slow\nosd.20 slow\nosd.10 slow\n",
        )
        .unwrap();
        let ctx = RunContext::new(tmp.path());

        let (_, findings) = run(
            &ctx,
            "scn:\n\
             \x20 input:\n\
             \x20   path: ceph.log\n\
             \x20 checks:\n\
             \x20   slow_osds:\n\
             \x20     expr: 'osd\\.(\\d+) slow'\n\
             \x20 conclusions:\n\
             \x20   report:\n\
             \x20     decision: slow_osds\n\
             \x20     raises:\n\
             \x20       message: 'slow osds: {ids}'\n\
             \x20       format-dict:\n\
             \x20         ids: '@checks.slow_osds.expr.results_group_1:comma_join'\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "slow osds: 10, 20");
    }

    #[test]
    fn test_format_groups_from_triggering_check() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "fault code=17 module=rbd\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        let (_, findings) = run(
            &ctx,
            "scn:\n\
             \x20 input:\n\
             \x20   path: app.log\n\
             \x20 checks:\n\
             \x20   fault:\n\
             \x20     expr: 'fault code=(\\d+) module=(\\w+)'\n\
             \x20 conclusions:\n\
             \x20   report:\n\
             \x20     decision: fault\n\
             \x20     raises:\n\
             \x20       message: 'module {} raised fault {}'\n\
             \x20       format-groups: [2, 1]\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "module rbd raised fault 17");
    }

    #[test]
    fn test_requirement_and_search_checks_combine() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "ERROR\n").unwrap();
        let ctx = RunContext::new(tmp.path())
            .with_property("feature.enabled", |_ctx| Some(Value::Bool(true)));

        let (_, findings) = run(
            &ctx,
            "scn:\n\
             \x20 input:\n\
             \x20   path: app.log\n\
             \x20 checks:\n\
             \x20   logged:\n\
             \x20     expr: ERROR\n\
             \x20   enabled:\n\
             \x20     requires:\n\
             \x20       property: feature.enabled\n\
             \x20 conclusions:\n\
             \x20   both:\n\
             \x20     decision:\n\
             \x20       and: [logged, enabled]\n\
             \x20     raises: {message: both present}\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "both present");
    }

    #[test]
    fn test_no_conclusion_reached_no_finding() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path());
        // input file does not exist: zero matches, check false
        let (emitted, findings) = run(
            &ctx,
            "scn:\n\
             \x20 input:\n\
             \x20   path: absent.log\n\
             \x20 checks:\n\
             \x20   c1:\n\
             \x20     expr: ERROR\n\
             \x20 conclusions:\n\
             \x20   hit:\n\
             \x20     decision: c1\n\
             \x20     raises: {message: never}\n",
        );
        assert_eq!(emitted, 0);
        assert!(findings.is_empty());
    }
}
