//! Findings and the run-wide issue sink

use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::DefinitionError;

/// Classification of an emitted finding. Closed set; definitions naming
/// anything else fail at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    PotentialIssue,
    KnownBug,
    Warning,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::PotentialIssue => "potential-issue",
            FindingKind::KnownBug => "known-bug",
            FindingKind::Warning => "warning",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FindingKind {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "potential-issue" => Ok(FindingKind::PotentialIssue),
            "known-bug" => Ok(FindingKind::KnownBug),
            "warning" => Ok(FindingKind::Warning),
            other => Err(DefinitionError::UnknownFindingKind(other.to_string())),
        }
    }
}

/// One finding. `origin` identifies the rule-domain and sub-part that
/// raised it, e.g. `scenarios.storage.my-scenario`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub message: String,
    pub origin: String,
}

/// Append-only collector of findings for one run. Fire-and-forget:
/// callers add and move on; nothing is ever removed until the run ends.
#[derive(Debug, Default)]
pub struct IssueSink {
    findings: RefCell<Vec<Finding>>,
}

impl IssueSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, kind: FindingKind, message: impl Into<String>, origin: impl Into<String>) {
        self.findings.borrow_mut().push(Finding {
            kind,
            message: message.into(),
            origin: origin.into(),
        });
    }

    pub fn findings(&self) -> Vec<Finding> {
        self.findings.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.findings.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for name in ["potential-issue", "known-bug", "warning"] {
            let kind: FindingKind = name.parse().unwrap();
            assert_eq!(kind.to_string(), name);
        }
    }

    #[test]
    fn test_unknown_kind_fails() {
        let err = "critical".parse::<FindingKind>().unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownFindingKind(_)));
    }

    #[test]
    fn test_sink_appends_in_order() {
        let sink = IssueSink::new();
        sink.add(FindingKind::Warning, "first", "scenarios.a");
        sink.add(FindingKind::KnownBug, "second", "bugs.b");
        let findings = sink.findings();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].message, "first");
        assert_eq!(findings[1].kind, FindingKind::KnownBug);
    }
}
