//! Run report: findings and event output grouped by domain

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as Json;

use crate::issues::{Finding, FindingKind};

/// Everything one rule domain produced. Empty groups are left out of the
/// serialized output so a clean domain renders as nothing at all.
#[derive(Debug, Default, Serialize)]
pub struct DomainReport {
    #[serde(rename = "potential-issues", skip_serializing_if = "Vec::is_empty")]
    pub potential_issues: Vec<String>,
    #[serde(rename = "known-bugs", skip_serializing_if = "Vec::is_empty")]
    pub known_bugs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub events: serde_json::Map<String, Json>,
}

impl DomainReport {
    pub fn is_empty(&self) -> bool {
        self.potential_issues.is_empty()
            && self.known_bugs.is_empty()
            && self.warnings.is_empty()
            && self.events.is_empty()
    }
}

/// The whole run, keyed by domain name. BTreeMap keeps the rendered
/// output stable across runs.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Report {
    domains: BTreeMap<String, DomainReport>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_finding(&mut self, domain: &str, finding: &Finding) {
        let entry = self.domains.entry(domain.to_string()).or_default();
        let group = match finding.kind {
            FindingKind::PotentialIssue => &mut entry.potential_issues,
            FindingKind::KnownBug => &mut entry.known_bugs,
            FindingKind::Warning => &mut entry.warnings,
        };
        group.push(finding.message.clone());
    }

    pub fn add_findings(&mut self, domain: &str, findings: &[Finding]) {
        for finding in findings {
            self.add_finding(domain, finding);
        }
    }

    pub fn add_events(&mut self, domain: &str, events: serde_json::Map<String, Json>) {
        if events.is_empty() {
            return;
        }
        let entry = self.domains.entry(domain.to_string()).or_default();
        for (key, value) in events {
            entry.events.insert(key, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.domains.values().all(DomainReport::is_empty)
    }

    /// Total number of findings across all domains, events excluded.
    pub fn finding_count(&self) -> usize {
        self.domains
            .values()
            .map(|d| d.potential_issues.len() + d.known_bugs.len() + d.warnings.len())
            .sum()
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
