//! Collector contract
//!
//! A collector answers a named point query with lines of output, the way a
//! command capture in a support bundle does. Collectors are idempotent and
//! side-effect-free from the engine's point of view; returning `None`
//! means "source not found" and is never an error. Input properties
//! resolve collector names through the registry at rule-load time, so a
//! typo in a definition fails fast instead of at evaluation time.

use crate::error::EvalError;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Positional and keyword arguments for one collector invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    pub args: Vec<String>,
    pub kwargs: BTreeMap<String, String>,
}

impl CommandArgs {
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// A named source of command-style output lines.
pub trait Collector {
    fn name(&self) -> &str;

    /// Produce output lines, or None when the underlying source is absent.
    fn run(&self, data_root: &Path, args: &CommandArgs) -> Result<Option<Vec<String>>, EvalError>;
}

/// Collector backed by one capture file under the data root.
pub struct FileCollector {
    name: String,
    relative: PathBuf,
}

impl FileCollector {
    pub fn new(name: &str, relative: &str) -> Self {
        Self {
            name: name.to_string(),
            relative: PathBuf::from(relative),
        }
    }
}

impl Collector for FileCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, data_root: &Path, _args: &CommandArgs) -> Result<Option<Vec<String>>, EvalError> {
        let path = data_root.join(&self.relative);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content.lines().map(str::to_string).collect())),
            Err(_) => {
                debug!("collector '{}': nothing at {}", self.name, path.display());
                Ok(None)
            }
        }
    }
}

/// Collector backed by a closure; the unit-test seam.
pub struct FnCollector<F> {
    name: String,
    func: F,
}

impl<F> FnCollector<F>
where
    F: Fn(&Path, &CommandArgs) -> Result<Option<Vec<String>>, EvalError>,
{
    pub fn new(name: &str, func: F) -> Self {
        Self {
            name: name.to_string(),
            func,
        }
    }
}

impl<F> Collector for FnCollector<F>
where
    F: Fn(&Path, &CommandArgs) -> Result<Option<Vec<String>>, EvalError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, data_root: &Path, args: &CommandArgs) -> Result<Option<Vec<String>>, EvalError> {
        (self.func)(data_root, args)
    }
}

/// Registry of named collectors.
pub struct CollectorRegistry {
    collectors: HashMap<String, Box<dyn Collector>>,
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        let mut registry = Self {
            collectors: HashMap::new(),
        };
        registry.register(Box::new(FileCollector::new(
            "journal",
            "sos_commands/logs/journalctl_--no-pager",
        )));
        registry.register(Box::new(FileCollector::new(
            "dmesg",
            "sos_commands/kernel/dmesg",
        )));
        registry.register(Box::new(FileCollector::new("ps", "ps")));
        registry
    }
}

impl CollectorRegistry {
    pub fn register(&mut self, collector: Box<dyn Collector>) {
        self.collectors
            .insert(collector.name().to_string(), collector);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Collector> {
        self.collectors.get(name).map(|c| c.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collectors.contains_key(name)
    }
}
