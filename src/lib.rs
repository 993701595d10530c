//! Triage - rule-driven diagnostics for live hosts and support bundles
//!
//! Triage inspects a system snapshot (an sosreport-style directory tree,
//! or `/` on a live host) and evaluates declarative YAML rules against
//! it. Rules come in four flavors:
//!
//! - **scenarios**: named checks (log searches or requirement trees)
//!   combined by boolean decision expressions into prioritized
//!   conclusions
//! - **events**: named log patterns whose matches are handed to
//!   registered callbacks
//! - **bugs**: known-bug signatures raised from log matches or installed
//!   package versions
//! - **config-checks**: assertions over configuration files
//!
//! # Architecture
//!
//! ```text
//! CLI/API -> RunContext -> DefLoader -> {Scenario,Event,Bug,Config}
//!            checkers -> FileSearcher (one pass per source) -> IssueSink
//! ```
//!
//! A [`context::RunContext`] carries the snapshot location and every
//! registry (collectors, config handlers, property resolvers, callbacks);
//! it is built once and threaded by reference through the whole run.
//! All log expressions for one rule group register against a single
//! [`search::FileSearcher`] so every source file is scanned exactly once.

pub mod bugs;
pub mod config_checks;
pub mod context;
pub mod defs;
pub mod error;
pub mod events;
pub mod facts;
pub mod issues;
pub mod props;
pub mod report;
pub mod requires;
pub mod scenario;
pub mod search;

// Re-export main types
pub use bugs::BugChecker;
pub use config_checks::ConfigChecker;
pub use context::RunContext;
pub use defs::{DefLoader, DefTree};
pub use error::{DefinitionError, EvalError};
pub use events::{CallbackOutput, EventChecker, EventResult};
pub use issues::{Finding, FindingKind, IssueSink};
pub use report::{DomainReport, Report};
pub use scenario::{Scenario, ScenarioRunner};
pub use search::{FileSearcher, SearchCatalog, SearchDef, SearchResult, SequenceDef};
