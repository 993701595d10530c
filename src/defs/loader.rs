//! Loads rule groups from the definitions root.
//!
//! Two layouts are supported. The preferred one is a directory tree:
//! every subdirectory becomes a grouping section and every YAML file a
//! section named after its stem. A file whose stem equals its parent
//! directory name is a directory-level defaults file; its content merges
//! into the parent section instead of becoming a child. The legacy layout
//! is a single flat document per top-level group.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde_yaml::{Mapping, Value};
use walkdir::WalkDir;

use crate::context::RunContext;
use crate::defs::DefTree;
use crate::error::DefinitionError;

pub struct DefLoader {
    defs_root: PathBuf,
}

impl DefLoader {
    pub fn new(ctx: &RunContext) -> Self {
        Self {
            defs_root: ctx.defs_root().to_path_buf(),
        }
    }

    /// Load one rule group, e.g. `scenarios/storage`. Returns `Ok(None)`
    /// when the group has no definitions at all.
    pub fn load(&self, group: &str) -> Result<Option<DefTree>, DefinitionError> {
        let dir = self.defs_root.join(group);
        let content = if dir.is_dir() {
            debug!("loading definitions from directory {}", dir.display());
            Some(load_dir(&dir)?)
        } else {
            self.load_flat(group)?
        };
        let Some(content) = content else {
            debug!("no definitions for group '{group}'");
            return Ok(None);
        };
        let tree = DefTree::build(&group.replace('/', "."), &content)?;
        if tree.is_empty() {
            return Ok(None);
        }
        Ok(Some(tree))
    }

    /// Legacy single-document layout: `<defs_root>/scenarios.yaml` keyed
    /// by rule-domain name.
    fn load_flat(&self, group: &str) -> Result<Option<Value>, DefinitionError> {
        let mut parts = group.split('/');
        let Some(top) = parts.next() else {
            return Ok(None);
        };
        let Some(file) = yaml_file(&self.defs_root, top) else {
            return Ok(None);
        };
        debug!("loading definitions from document {}", file.display());
        let mut content = parse_file(&file)?;
        for part in parts {
            let Value::Mapping(m) = content else {
                return Ok(None);
            };
            match m.get(part) {
                Some(inner) => content = inner.clone(),
                None => return Ok(None),
            }
        }
        Ok(Some(content))
    }
}

fn yaml_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    for ext in ["yaml", "yml"] {
        let candidate = dir.join(format!("{stem}.{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn parse_file(file: &Path) -> Result<Value, DefinitionError> {
    let raw = fs::read_to_string(file)?;
    serde_yaml::from_str(&raw).map_err(|source| DefinitionError::Parse {
        file: file.to_path_buf(),
        source,
    })
}

/// Assemble a directory into one mapping. Entries are visited in name
/// order so tree building stays deterministic across filesystems.
fn load_dir(dir: &Path) -> Result<Value, DefinitionError> {
    let dir_name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        entries.push(entry.map_err(io::Error::from)?.into_path());
    }

    let mut mapping = Mapping::new();

    // Directory-level defaults come first so they sit above the children
    // in document order.
    for path in &entries {
        if !is_yaml(path) || stem_of(path) != dir_name {
            continue;
        }
        match parse_file(path)? {
            Value::Null => {}
            Value::Mapping(m) => {
                for (key, value) in m {
                    mapping.insert(key, value);
                }
            }
            _ => {
                return Err(DefinitionError::invalid(
                    path.display().to_string(),
                    "defaults file must contain a mapping",
                ));
            }
        }
    }

    for path in &entries {
        let (name, content) = if path.is_dir() {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            (name, load_dir(path)?)
        } else if is_yaml(path) && stem_of(path) != dir_name {
            (stem_of(path), parse_file(path)?)
        } else {
            continue;
        };
        let key = Value::String(name.clone());
        if mapping.insert(key, content).is_some() {
            debug!(
                "definition '{}' in {} shadows an earlier entry",
                name,
                dir.display()
            );
        }
    }

    Ok(Value::Mapping(mapping))
}

fn is_yaml(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        )
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}
