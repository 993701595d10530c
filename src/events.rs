//! Event scanning: named log patterns dispatched to callbacks
//!
//! Event leaf definitions register searches (flat, sequence, or
//! passthrough start/end pairs) against one shared searcher. After the
//! single search pass, every event with at least one match is handed to
//! the callback registered under its name. A missing callback is a
//! contract violation and fails the run; events are useless without the
//! code that interprets their matches.

use std::collections::HashMap;

use log::debug;
use serde_json::Value as Json;
use serde_yaml::Value;

use crate::context::RunContext;
use crate::defs::{DefTree, NodeId};
use crate::error::{DefinitionError, EvalError};
use crate::props::{scalar_string, ExprProperty, InputProperty};
use crate::requires::RequiresProperty;
use crate::search::{FileSearcher, SearchCatalog, SearchDef, SearchResult, Section, SequenceDef};

/// What one matched event hands to its callback.
pub struct EventResult<'a> {
    /// Name of the grouping section the event sits under.
    pub group: String,
    /// The event's own name.
    pub name: String,
    /// Every matching line, in scan order. For sequences this holds the
    /// tagged start/body/end sub-results; for passthrough events the
    /// raw `-start`/`-end` matches.
    pub results: Vec<&'a SearchResult>,
    /// Matched spans, for sequence events only.
    pub sections: &'a [Section],
}

/// Output of one callback: a report fragment, optionally redirected to
/// an alternate output key instead of the event's own name.
pub struct CallbackOutput {
    pub fragment: Json,
    pub output_key: Option<String>,
}

impl CallbackOutput {
    pub fn fragment(fragment: Json) -> Self {
        Self {
            fragment,
            output_key: None,
        }
    }

    pub fn redirected(fragment: Json, key: &str) -> Self {
        Self {
            fragment,
            output_key: Some(key.to_string()),
        }
    }
}

pub type EventCallback =
    Box<dyn Fn(&RunContext, &EventResult<'_>) -> Result<Option<CallbackOutput>, EvalError>>;

enum EventShape {
    Flat,
    Sequence,
    Passthrough,
}

struct Event {
    name: String,
    group: String,
    tag: String,
    shape: EventShape,
}

/// Loads event definitions for one rule group, runs the shared search
/// and dispatches matches to named callbacks.
pub struct EventChecker<'ctx> {
    ctx: &'ctx RunContext,
    callbacks: HashMap<String, EventCallback>,
}

impl<'ctx> EventChecker<'ctx> {
    pub fn new(ctx: &'ctx RunContext) -> Self {
        Self {
            ctx,
            callbacks: HashMap::new(),
        }
    }

    pub fn with_callback<F>(mut self, event: &str, callback: F) -> Self
    where
        F: Fn(&RunContext, &EventResult<'_>) -> Result<Option<CallbackOutput>, EvalError> + 'static,
    {
        self.callbacks.insert(event.to_string(), Box::new(callback));
        self
    }

    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    /// Run every event in the tree and merge the callback fragments into
    /// one output mapping. Fragments land under the event's own name
    /// unless the callback redirects them; fragments redirected to the
    /// same key shallow-merge instead of replacing each other.
    pub fn run(&self, tree: &DefTree) -> Result<serde_json::Map<String, Json>, EvalError> {
        let mut searcher = FileSearcher::new();
        let mut events = Vec::new();
        for leaf in tree.leaf_sections() {
            if let Some(event) = self.load_event(tree, leaf, &mut searcher)? {
                events.push(event);
            }
        }

        let catalog = searcher.search();

        let mut output = serde_json::Map::new();
        for event in &events {
            let (results, sections) = collect_matches(event, &catalog);
            if results.is_empty() && sections.is_empty() {
                continue;
            }
            let Some(callback) = self.callbacks.get(&event.name) else {
                return Err(EvalError::NoCallback(event.name.clone()));
            };
            let event_result = EventResult {
                group: event.group.clone(),
                name: event.name.clone(),
                results,
                sections,
            };
            let Some(out) = callback(self.ctx, &event_result)? else {
                continue;
            };
            let key = out.output_key.as_deref().unwrap_or(&event.name);
            merge_fragment(&mut output, key, out.fragment);
        }
        Ok(output)
    }

    /// Parse one event leaf and register its search terms. Returns
    /// `Ok(None)` when the event's `requires` gate fails.
    fn load_event(
        &self,
        tree: &DefTree,
        leaf: NodeId,
        searcher: &mut FileSearcher,
    ) -> Result<Option<Event>, EvalError> {
        let at = tree.path(leaf);
        let node = tree.node(leaf);

        if let Some(raw) = tree.resolved(leaf, "requires") {
            let mut gate = RequiresProperty::parse(&at, raw, self.ctx)?;
            if !gate.evaluate(self.ctx)? {
                debug!("event '{at}' gate failed, skipping");
                return Ok(None);
            }
        }

        let input_raw = tree.resolved(leaf, "input").ok_or_else(|| {
            DefinitionError::invalid(&at, "an event needs an 'input'")
        })?;
        let input = InputProperty::parse(&at, input_raw, self.ctx)?;
        let sources = input.sources(self.ctx)?.to_vec();

        let passthrough = node
            .override_raw("passthrough-results")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let hint = tree.resolved(leaf, "hint").and_then(scalar_string);

        let shape = match (node.override_raw("expr"), node.override_raw("start")) {
            (Some(_), Some(_)) => {
                return Err(DefinitionError::invalid(
                    &at,
                    "an event takes 'expr' or 'start', not both",
                )
                .into());
            }
            (Some(raw), None) => {
                let expr = ExprProperty::parse(&at, raw)?.or_hint(hint);
                let def = SearchDef::new(&at, expr.patterns(), expr.hint())?;
                for source in &sources {
                    searcher.add(&def, source);
                }
                EventShape::Flat
            }
            (None, Some(raw)) => {
                let start = ExprProperty::parse(&at, raw)?.or_hint(hint);
                let end = match node.override_raw("end") {
                    Some(v) => Some(ExprProperty::parse(&at, v)?),
                    None => None,
                };
                if passthrough {
                    let Some(end) = end else {
                        return Err(DefinitionError::invalid(
                            &at,
                            "a passthrough event needs 'start' and 'end'",
                        )
                        .into());
                    };
                    let start_def =
                        SearchDef::new(&format!("{at}-start"), start.patterns(), start.hint())?;
                    let end_def = SearchDef::new(&format!("{at}-end"), end.patterns(), end.hint())?;
                    for source in &sources {
                        searcher.add(&start_def, source);
                        searcher.add(&end_def, source);
                    }
                    EventShape::Passthrough
                } else {
                    let body = match node.override_raw("body") {
                        Some(v) => Some(ExprProperty::parse(&at, v)?),
                        None => None,
                    };
                    let seq = SequenceDef::new(
                        &at,
                        SearchDef::new(&at, start.patterns(), start.hint())?,
                        body.map(|b| SearchDef::new(&at, b.patterns(), b.hint()))
                            .transpose()?,
                        end.map(|e| SearchDef::new(&at, e.patterns(), e.hint()))
                            .transpose()?,
                    );
                    for source in &sources {
                        searcher.add_sequence(&seq, source);
                    }
                    EventShape::Sequence
                }
            }
            (None, None) => {
                return Err(DefinitionError::invalid(
                    &at,
                    "an event needs an 'expr' or a 'start'",
                )
                .into());
            }
        };

        Ok(Some(Event {
            name: node.name.clone(),
            group: parent_name(tree, leaf),
            tag: at,
            shape,
        }))
    }
}

fn parent_name(tree: &DefTree, leaf: NodeId) -> String {
    let path = tree.path(leaf);
    let mut parts: Vec<&str> = path.split('.').collect();
    parts.pop();
    parts.last().unwrap_or(&"").to_string()
}

fn collect_matches<'a>(
    event: &Event,
    catalog: &'a SearchCatalog,
) -> (Vec<&'a SearchResult>, &'a [Section]) {
    match event.shape {
        EventShape::Flat => (catalog.by_tag(&event.tag), &[]),
        EventShape::Sequence => {
            let mut results = Vec::new();
            for suffix in ["start", "body", "end"] {
                results.extend(catalog.by_tag(&format!("{}-{}", event.tag, suffix)));
            }
            (results, catalog.sections_for(&event.tag))
        }
        EventShape::Passthrough => {
            let mut results = catalog.by_tag(&format!("{}-start", event.tag));
            results.extend(catalog.by_tag(&format!("{}-end", event.tag)));
            (results, &[])
        }
    }
}

/// Merge one fragment under a key. Two mappings shallow-merge
/// (key-wise update); anything else replaces.
fn merge_fragment(output: &mut serde_json::Map<String, Json>, key: &str, fragment: Json) {
    match (output.get_mut(key), fragment) {
        (Some(Json::Object(existing)), Json::Object(incoming)) => {
            for (k, v) in incoming {
                existing.insert(k, v);
            }
        }
        (_, fragment) => {
            output.insert(key.to_string(), fragment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn tree_from(yaml: &str) -> DefTree {
        let content: Value = serde_yaml::from_str(yaml).unwrap();
        DefTree::build("events.test", &content).unwrap()
    }

    #[test]
    fn test_flat_event_dispatches_to_callback() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "conn reset\nok\nconn reset\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        let tree = tree_from(
            "network:\n\
             \x20 conn-resets:\n\
             \x20   input:\n\
             \x20     path: app.log\n\
             \x20   expr: conn reset\n",
        );
        let checker = EventChecker::new(&ctx).with_callback("conn-resets", |_ctx, event| {
            assert_eq!(event.group, "network");
            Ok(Some(CallbackOutput::fragment(json!(event.results.len()))))
        });
        let output = checker.run(&tree).unwrap();
        assert_eq!(output.get("conn-resets"), Some(&json!(2)));
    }

    #[test]
    fn test_event_without_matches_not_dispatched() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "all quiet\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        let tree = tree_from(
            "network:\n\
             \x20 conn-resets:\n\
             \x20   input:\n\
             \x20     path: app.log\n\
             \x20   expr: conn reset\n",
        );
        let checker = EventChecker::new(&ctx)
            .with_callback("conn-resets", |_ctx, _event| panic!("must not be called"));
        let output = checker.run(&tree).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_missing_callback_is_fatal() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "conn reset\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        let tree = tree_from(
            "network:\n\
             \x20 conn-resets:\n\
             \x20   input:\n\
             \x20     path: app.log\n\
             \x20   expr: conn reset\n",
        );
        let err = EventChecker::new(&ctx).run(&tree).unwrap_err();
        assert!(matches!(err, EvalError::NoCallback(name) if name == "conn-resets"));
    }

    #[test]
    fn test_sequence_event_receives_sections() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("dump.log"),
            "report start\nentry 1\nentry 2\nreport end\n",
        )
        .unwrap();
        let ctx = RunContext::new(tmp.path());

        let tree = tree_from(
            "storage:\n\
             \x20 osd-report:\n\
             \x20   input:\n\
             \x20     path: dump.log\n\
             \x20   start:\n\
             \x20     expr: '^report start'\n\
             \x20   body:\n\
             \x20     expr: '^entry (\\d+)'\n\
             \x20   end:\n\
             \x20     expr: '^report end'\n",
        );
        let checker = EventChecker::new(&ctx).with_callback("osd-report", |_ctx, event| {
            assert_eq!(event.sections.len(), 1);
            let entries = event.sections[0].body().len();
            Ok(Some(CallbackOutput::fragment(json!({ "entries": entries }))))
        });
        let output = checker.run(&tree).unwrap();
        assert_eq!(output.get("osd-report"), Some(&json!({"entries": 2})));
    }

    #[test]
    fn test_passthrough_event_gets_raw_results() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("app.log"),
            "req 1 begin\nreq 2 begin\nreq 1 done\nreq 2 done\n",
        )
        .unwrap();
        let ctx = RunContext::new(tmp.path());

        let tree = tree_from(
            "api:\n\
             \x20 req-times:\n\
             \x20   input:\n\
             \x20     path: app.log\n\
             \x20   passthrough-results: true\n\
             \x20   start:\n\
             \x20     expr: 'req (\\d+) begin'\n\
             \x20   end:\n\
             \x20     expr: 'req (\\d+) done'\n",
        );
        let checker = EventChecker::new(&ctx).with_callback("req-times", |_ctx, event| {
            // raw matches, no pre-grouping: caller pairs them itself
            let starts = event
                .results
                .iter()
                .filter(|r| r.tag().ends_with("-start"))
                .count();
            let ends = event
                .results
                .iter()
                .filter(|r| r.tag().ends_with("-end"))
                .count();
            Ok(Some(CallbackOutput::fragment(json!([starts, ends]))))
        });
        let output = checker.run(&tree).unwrap();
        assert_eq!(output.get("req-times"), Some(&json!([2, 2])));
    }

    #[test]
    fn test_redirected_fragments_shallow_merge() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "alpha\nbeta\n").unwrap();
        let ctx = RunContext::new(tmp.path());

        let tree = tree_from(
            "grp:\n\
             \x20 first:\n\
             \x20   input: {path: app.log}\n\
             \x20   expr: alpha\n\
             \x20 second:\n\
             \x20   input: {path: app.log}\n\
             \x20   expr: beta\n",
        );
        let checker = EventChecker::new(&ctx)
            .with_callback("first", |_ctx, _event| {
                Ok(Some(CallbackOutput::redirected(json!({"a": 1}), "combined")))
            })
            .with_callback("second", |_ctx, _event| {
                Ok(Some(CallbackOutput::redirected(json!({"b": 2}), "combined")))
            });
        let output = checker.run(&tree).unwrap();
        assert_eq!(output.get("combined"), Some(&json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_gated_event_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.log"), "hit\n").unwrap();
        let ctx = RunContext::new(tmp.path())
            .with_property("platform.relevant", |_ctx| Some(Value::Bool(false)));

        let tree = tree_from(
            "grp:\n\
             \x20 gated:\n\
             \x20   input: {path: app.log}\n\
             \x20   requires:\n\
             \x20     property: platform.relevant\n\
             \x20   expr: hit\n",
        );
        let checker = EventChecker::new(&ctx)
            .with_callback("gated", |_ctx, _event| panic!("must not be called"));
        let output = checker.run(&tree).unwrap();
        assert!(output.is_empty());
    }
}
