//! Error types for definition loading and rule evaluation
//!
//! Two taxonomies, kept deliberately separate: a `DefinitionError` means a
//! rule author broke something and the run must surface it loudly; an
//! `EvalError` means evaluation itself failed partway and the current
//! scenario run is aborted. Missing data sources are neither — they are
//! empty results by contract.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration error in the rule definitions themselves.
///
/// Never caught inside the engine; a broken definition must be fixed,
/// not tolerated.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read definitions: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {}: {source}", file.display())]
    Parse {
        file: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid definition shape at '{at}': {reason}")]
    InvalidShape { at: String, reason: String },

    #[error("invalid search pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("unknown requirement type '{0}'")]
    UnknownRequirement(String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("unknown collector '{0}'")]
    UnknownCollector(String),

    #[error("unknown config handler '{0}'")]
    UnknownConfigHandler(String),

    #[error("unknown property path '{0}'")]
    UnknownProperty(String),

    #[error("unknown finding kind '{0}'")]
    UnknownFindingKind(String),

    #[error("unknown render function '{0}'")]
    UnknownRenderFn(String),

    #[error("conclusion '{conclusion}' references unknown check '{check}'")]
    UnknownCheck { conclusion: String, check: String },
}

impl DefinitionError {
    /// Shorthand for shape violations.
    pub fn invalid(at: impl Into<String>, reason: impl Into<String>) -> Self {
        DefinitionError::InvalidShape {
            at: at.into(),
            reason: reason.into(),
        }
    }
}

/// Evaluation-time failure. Logged with context and propagated, aborting
/// the current scenario's run; never converted into a finding.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("collector '{name}' failed: {reason}")]
    Collector { name: String, reason: String },

    #[error("no callback registered for event '{0}'")]
    NoCallback(String),

    #[error("callback for event '{event}' failed: {reason}")]
    Callback { event: String, reason: String },

    #[error("failed to create scratch directory: {0}")]
    ScratchDir(std::io::Error),

    #[error("failed to write scratch file {}: {source}", file.display())]
    Scratch {
        file: PathBuf,
        source: std::io::Error,
    },
}
