//! Definition trees
//!
//! A rule group loads into a tree of named sections. Section nodes are
//! either branches (groupings with child sections) or leaves (innermost
//! named rule definitions whose entire content resolved into overrides) —
//! the variant is decided once, during parse, never inferred later.
//! Nodes live in an arena so parent references are plain indices.

pub mod loader;
pub mod overrides;

pub use loader::DefLoader;

use crate::error::DefinitionError;
use serde_yaml::Value;

/// Index of a node within its tree's arena.
pub type NodeId = usize;

/// Branch vs leaf, decided at construction.
#[derive(Debug)]
pub enum NodeKind {
    Branch { children: Vec<NodeId> },
    Leaf,
}

/// One named section.
#[derive(Debug)]
pub struct DefNode {
    pub name: String,
    parent: Option<NodeId>,
    kind: NodeKind,
    /// Raw override fragments in document order.
    overrides: Vec<(String, Value)>,
}

impl DefNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf)
    }

    /// Raw override content attached directly to this node.
    pub fn override_raw(&self, key: &str) -> Option<&Value> {
        self.overrides
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn override_keys(&self) -> impl Iterator<Item = &str> {
        self.overrides.iter().map(|(k, _)| k.as_str())
    }
}

/// An arena-backed tree of sections for one rule group.
#[derive(Debug)]
pub struct DefTree {
    group: String,
    nodes: Vec<DefNode>,
}

impl DefTree {
    /// Build a tree from raw group content. Content must be a mapping (or
    /// null for an empty group); any non-override key must itself hold a
    /// mapping, otherwise the definitions are malformed and loading fails.
    pub fn build(group: &str, content: &Value) -> Result<Self, DefinitionError> {
        let mut tree = Self {
            group: group.to_string(),
            nodes: Vec::new(),
        };
        tree.build_node(group, content, None)?;
        Ok(tree)
    }

    fn build_node(
        &mut self,
        name: &str,
        content: &Value,
        parent: Option<NodeId>,
    ) -> Result<NodeId, DefinitionError> {
        let id = self.nodes.len();
        self.nodes.push(DefNode {
            name: name.to_string(),
            parent,
            kind: NodeKind::Branch {
                children: Vec::new(),
            },
            overrides: Vec::new(),
        });

        let mapping = match content {
            Value::Null => {
                return Ok(id);
            }
            Value::Mapping(m) => m,
            other => {
                return Err(DefinitionError::invalid(
                    self.path(id),
                    format!(
                        "expected a mapping of child sections, found {}",
                        value_kind(other)
                    ),
                ));
            }
        };

        let mut children = Vec::new();
        for (key, value) in mapping {
            let Some(key) = key.as_str() else {
                return Err(DefinitionError::invalid(
                    self.path(id),
                    "section names must be strings",
                ));
            };
            if overrides::is_override(key) {
                self.nodes[id].overrides.push((key.to_string(), value.clone()));
            } else {
                let child = self.build_node(key, value, Some(id))?;
                children.push(child);
            }
        }

        // A section whose entire (non-empty) content resolved into
        // overrides is an innermost rule definition.
        if children.is_empty() && !self.nodes[id].overrides.is_empty() {
            self.nodes[id].kind = NodeKind::Leaf;
        } else {
            self.nodes[id].kind = NodeKind::Branch { children };
        }
        Ok(id)
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &DefNode {
        &self.nodes[id]
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1 && self.nodes[0].overrides.is_empty()
    }

    /// All leaf sections in document order.
    pub fn leaf_sections(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&id| self.nodes[id].is_leaf())
            .collect()
    }

    /// All branch sections (groupings) in document order, root included.
    pub fn branch_sections(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&id| !self.nodes[id].is_leaf())
            .collect()
    }

    /// Dotted path from the group root down to a node.
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            parts.push(self.nodes[cur].name.as_str());
            current = self.nodes[cur].parent;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Resolve an override for a node, walking ancestors so that
    /// directory-level defaults apply to the leaves beneath them.
    pub fn resolved(&self, id: NodeId, key: &str) -> Option<&Value> {
        let mut current = Some(id);
        while let Some(cur) = current {
            if let Some(value) = self.nodes[cur].override_raw(key) {
                return Some(value);
            }
            current = self.nodes[cur].parent;
        }
        None
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
