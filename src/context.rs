//! Run context
//!
//! One immutable value carries everything a run needs: where the snapshot
//! lives, where definitions live, the reference "now", the per-run scratch
//! directory and the registries (collectors, config handlers, property
//! paths, input args callbacks, fact sources). It is built once and passed
//! by reference through loaders, searchers and evaluators — there is no
//! process-global configuration anywhere in the engine.

use crate::error::EvalError;
use crate::facts::collect::{CollectorRegistry, CommandArgs};
use crate::facts::configfile::ConfigHandlerRegistry;
use crate::facts::packages::{SnapshotPackages, SnapshotSnaps};
use crate::facts::properties::PropertyRegistry;
use crate::facts::services::SnapshotServices;
use crate::facts::{PackageFacts, ServiceFacts, SnapFacts};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::debug;
use once_cell::unsync::OnceCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Callback producing collector arguments for an `input` definition.
pub type ArgsCallback = Box<dyn Fn(&RunContext) -> CommandArgs>;

enum Scratch {
    /// Created lazily, deleted wholesale when the context drops.
    Owned(OnceCell<TempDir>),
    /// Caller-provided directory; caller owns cleanup.
    External(PathBuf),
}

/// Immutable per-run configuration and registries.
pub struct RunContext {
    data_root: PathBuf,
    defs_root: PathBuf,
    all_logs: bool,
    now: DateTime<Utc>,
    scratch: Scratch,
    collectors: CollectorRegistry,
    config_handlers: ConfigHandlerRegistry,
    properties: PropertyRegistry,
    args_callbacks: HashMap<String, ArgsCallback>,
    packages: Box<dyn PackageFacts>,
    snaps: Box<dyn SnapFacts>,
    services: Box<dyn ServiceFacts>,
}

impl RunContext {
    /// Context rooted at a snapshot directory (`/` for a live host).
    ///
    /// "Now" is taken from the snapshot's `date` capture when present so
    /// that time-window filters measure against the moment the bundle was
    /// taken, not the moment it is analyzed.
    pub fn new(data_root: &Path) -> Self {
        let now = read_snapshot_date(data_root).unwrap_or_else(Utc::now);
        Self {
            data_root: data_root.to_path_buf(),
            defs_root: PathBuf::from("defs"),
            all_logs: false,
            now,
            scratch: Scratch::Owned(OnceCell::new()),
            collectors: CollectorRegistry::default(),
            config_handlers: ConfigHandlerRegistry::default(),
            properties: PropertyRegistry::default(),
            args_callbacks: HashMap::new(),
            packages: Box::new(SnapshotPackages::new(data_root)),
            snaps: Box::new(SnapshotSnaps::new(data_root)),
            services: Box::new(SnapshotServices::new(data_root)),
        }
    }

    pub fn with_defs_root(mut self, defs_root: &Path) -> Self {
        self.defs_root = defs_root.to_path_buf();
        self
    }

    /// Include rotated copies of log inputs (`<path>*`).
    pub fn with_all_logs(mut self, all_logs: bool) -> Self {
        self.all_logs = all_logs;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Use an existing scratch directory instead of an owned temp dir.
    pub fn with_scratch_dir(mut self, dir: &Path) -> Self {
        self.scratch = Scratch::External(dir.to_path_buf());
        self
    }

    pub fn with_collector(mut self, collector: Box<dyn crate::facts::collect::Collector>) -> Self {
        self.collectors.register(collector);
        self
    }

    pub fn with_property<F>(mut self, path: &str, resolver: F) -> Self
    where
        F: Fn(&RunContext) -> Option<serde_yaml::Value> + 'static,
    {
        self.properties.register(path, resolver);
        self
    }

    pub fn with_config_handler(
        mut self,
        name: &str,
        format: crate::facts::configfile::ConfigFormat,
        default_path: Option<&str>,
    ) -> Self {
        self.config_handlers.register(name, format, default_path);
        self
    }

    pub fn with_args_callback<F>(mut self, name: &str, callback: F) -> Self
    where
        F: Fn(&RunContext) -> CommandArgs + 'static,
    {
        self.args_callbacks.insert(name.to_string(), Box::new(callback));
        self
    }

    pub fn with_packages(mut self, packages: Box<dyn PackageFacts>) -> Self {
        self.packages = packages;
        self
    }

    pub fn with_snaps(mut self, snaps: Box<dyn SnapFacts>) -> Self {
        self.snaps = snaps;
        self
    }

    pub fn with_services(mut self, services: Box<dyn ServiceFacts>) -> Self {
        self.services = services;
        self
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn defs_root(&self) -> &Path {
        &self.defs_root
    }

    pub fn all_logs(&self) -> bool {
        self.all_logs
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn collectors(&self) -> &CollectorRegistry {
        &self.collectors
    }

    pub fn config_handlers(&self) -> &ConfigHandlerRegistry {
        &self.config_handlers
    }

    pub fn properties(&self) -> &PropertyRegistry {
        &self.properties
    }

    pub fn args_callback(&self, name: &str) -> Option<&ArgsCallback> {
        self.args_callbacks.get(name)
    }

    pub fn packages(&self) -> &dyn PackageFacts {
        self.packages.as_ref()
    }

    pub fn snaps(&self) -> &dyn SnapFacts {
        self.snaps.as_ref()
    }

    pub fn services(&self) -> &dyn ServiceFacts {
        self.services.as_ref()
    }

    /// Per-run scratch directory, created on first use.
    pub fn scratch_dir(&self) -> Result<PathBuf, EvalError> {
        match &self.scratch {
            Scratch::External(dir) => Ok(dir.clone()),
            Scratch::Owned(cell) => {
                let dir = cell.get_or_try_init(TempDir::new).map_err(EvalError::ScratchDir)?;
                Ok(dir.path().to_path_buf())
            }
        }
    }

    /// Path for a named scratch file (not created).
    pub fn scratch_file(&self, name: &str) -> Result<PathBuf, EvalError> {
        Ok(self.scratch_dir()?.join(name))
    }
}

/// Parse a snapshot's `date` capture ("Tue Jan  2 03:04:05 UTC 2024").
fn read_snapshot_date(data_root: &Path) -> Option<DateTime<Utc>> {
    let content = fs::read_to_string(data_root.join("date")).ok()?;
    let parsed = parse_date_output(content.trim());
    if parsed.is_none() {
        debug!("unparsable snapshot date: {}", content.trim());
    }
    parsed
}

fn parse_date_output(s: &str) -> Option<DateTime<Utc>> {
    let fields: Vec<&str> = s.split_whitespace().collect();
    // weekday month day time zone year
    if fields.len() < 6 {
        return None;
    }
    let (month, day, time, year) = (fields[1], fields[2], fields[3], fields[5]);
    let date = NaiveDate::parse_from_str(&format!("{} {} {}", year, month, day), "%Y %b %d").ok()?;
    let naive = NaiveDateTime::parse_from_str(
        &format!("{} {}", date.format("%Y-%m-%d"), time),
        "%Y-%m-%d %H:%M:%S",
    )
    .ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_parse_date_output() {
        assert_eq!(
            parse_date_output("Tue Jan  2 03:04:05 UTC 2024"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
        assert!(parse_date_output("garbage").is_none());
    }

    #[test]
    fn test_now_from_snapshot_date() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("date"), "Mon Jun 10 12:00:00 UTC 2024\n").unwrap();
        let ctx = RunContext::new(root.path());
        assert_eq!(
            ctx.now(),
            Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_scratch_dir_is_stable_within_run() {
        let root = TempDir::new().unwrap();
        let ctx = RunContext::new(root.path());
        let a = ctx.scratch_dir().unwrap();
        let b = ctx.scratch_dir().unwrap();
        assert_eq!(a, b);
        assert!(a.exists());
    }

    #[test]
    fn test_external_scratch_dir() {
        let root = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let ctx = RunContext::new(root.path()).with_scratch_dir(scratch.path());
        assert_eq!(ctx.scratch_dir().unwrap(), scratch.path());
    }

    #[test]
    fn test_builder_flags() {
        let root = TempDir::new().unwrap();
        let ctx = RunContext::new(root.path())
            .with_all_logs(true)
            .with_defs_root(Path::new("/tmp/defs"));
        assert!(ctx.all_logs());
        assert_eq!(ctx.defs_root(), Path::new("/tmp/defs"));
    }
}
