//! Systemd service facts parsed from snapshot command output
//!
//! State comes from three captures: `systemctl list-units` (active/sub
//! state), `systemctl list-unit-files` (enablement) and `systemctl show
//! --all` (`Id=`/`ActiveEnterTimestamp=` pairs) for start times. A missing
//! capture degrades that axis to unknown, it never fails the run.

use super::ServiceFacts;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use once_cell::unsync::OnceCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const LIST_UNITS_CANDIDATES: &[&str] = &[
    "sos_commands/systemd/systemctl_list-units",
    "sos_commands/systemd/systemctl_list-units_--all",
];
const LIST_UNIT_FILES: &str = "sos_commands/systemd/systemctl_list-unit-files";
const SHOW_ALL: &str = "sos_commands/systemd/systemctl_show_--all";

/// Observed state of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceState {
    /// Service name without the `.service` suffix
    pub name: String,
    /// Enablement from unit files (enabled/disabled/masked/static/...)
    pub unit_file: Option<String>,
    /// Active state (active/inactive/failed/...)
    pub active: Option<String>,
    /// Sub state (running/exited/dead/...)
    pub sub: Option<String>,
    /// Last activation time
    pub start_time: Option<DateTime<Utc>>,
}

/// Words that name enablement states rather than runtime states.
const UNIT_FILE_STATES: &[&str] = &[
    "enabled",
    "enabled-runtime",
    "disabled",
    "masked",
    "masked-runtime",
    "static",
    "indirect",
    "generated",
    "transient",
    "alias",
];

/// Words that name sub states rather than active states.
const SUB_STATES: &[&str] = &[
    "running", "exited", "dead", "waiting", "listening", "plugged", "mounted", "auto-restart",
];

impl ServiceState {
    /// The observed value an expected-state word compares against.
    /// Enablement words route to the unit-file axis, sub-state words to
    /// the sub axis, everything else to the active axis.
    pub fn observed_for(&self, expected: &str) -> Option<&str> {
        if UNIT_FILE_STATES.contains(&expected) {
            self.unit_file.as_deref()
        } else if SUB_STATES.contains(&expected) {
            self.sub.as_deref()
        } else {
            self.active.as_deref()
        }
    }

    /// Short `name=state` summary used for cache rendering.
    pub fn summary(&self) -> String {
        let state = self
            .active
            .as_deref()
            .or(self.unit_file.as_deref())
            .unwrap_or("unknown");
        format!("{}={}", self.name, state)
    }
}

/// Service table backed by a snapshot's systemctl captures.
pub struct SnapshotServices {
    data_root: PathBuf,
    table: OnceCell<HashMap<String, ServiceState>>,
}

impl SnapshotServices {
    pub fn new(data_root: &Path) -> Self {
        Self {
            data_root: data_root.to_path_buf(),
            table: OnceCell::new(),
        }
    }

    fn table(&self) -> &HashMap<String, ServiceState> {
        self.table.get_or_init(|| {
            let mut table = HashMap::new();

            for candidate in LIST_UNITS_CANDIDATES {
                let path = self.data_root.join(candidate);
                if let Ok(content) = fs::read_to_string(&path) {
                    parse_list_units(&content, &mut table);
                    break;
                }
            }

            if let Ok(content) = fs::read_to_string(self.data_root.join(LIST_UNIT_FILES)) {
                parse_list_unit_files(&content, &mut table);
            }

            if let Ok(content) = fs::read_to_string(self.data_root.join(SHOW_ALL)) {
                parse_show_all(&content, &mut table);
            }

            if table.is_empty() {
                debug!("no systemd captures under {}", self.data_root.display());
            }
            table
        })
    }
}

impl ServiceFacts for SnapshotServices {
    fn service(&self, name: &str) -> Option<ServiceState> {
        self.table().get(name).cloned()
    }
}

fn service_name(unit: &str) -> Option<&str> {
    unit.strip_suffix(".service")
}

fn entry<'a>(
    table: &'a mut HashMap<String, ServiceState>,
    name: &str,
) -> &'a mut ServiceState {
    table.entry(name.to_string()).or_insert_with(|| ServiceState {
        name: name.to_string(),
        ..ServiceState::default()
    })
}

/// `  foo.service  loaded  active  running  description...`
fn parse_list_units(content: &str, table: &mut HashMap<String, ServiceState>) {
    for line in content.lines() {
        // A failed-unit marker prefixes the unit column as its own token;
        // a unit name may itself start with one of the marker characters.
        let line = line.trim_start();
        let line = match line.split_once(char::is_whitespace) {
            Some((first, rest)) if matches!(first, "●" | "*" | "x") => rest.trim_start(),
            _ => line,
        };
        let mut fields = line.split_whitespace();
        let (Some(unit), Some(_load), Some(active), Some(sub)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let Some(name) = service_name(unit) else {
            continue;
        };
        let state = entry(table, name);
        state.active = Some(active.to_string());
        state.sub = Some(sub.to_string());
    }
}

/// `foo.service  enabled  enabled`
fn parse_list_unit_files(content: &str, table: &mut HashMap<String, ServiceState>) {
    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let (Some(unit), Some(state)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some(name) = service_name(unit) else {
            continue;
        };
        // Template units (foo@.service) have no runtime state of their own.
        if name.ends_with('@') {
            continue;
        }
        entry(table, name).unit_file = Some(state.to_string());
    }
}

/// Blocks of `Key=Value` lines, one block per unit, keyed by `Id=`.
fn parse_show_all(content: &str, table: &mut HashMap<String, ServiceState>) {
    let mut current: Option<String> = None;
    for line in content.lines() {
        if let Some(unit) = line.strip_prefix("Id=") {
            current = service_name(unit.trim()).map(|n| n.to_string());
        } else if let Some(stamp) = line.strip_prefix("ActiveEnterTimestamp=") {
            if let Some(name) = &current {
                if let Some(when) = parse_systemd_timestamp(stamp.trim()) {
                    entry(table, name).start_time = Some(when);
                }
            }
        } else if line.is_empty() {
            current = None;
        }
    }
}

/// `Tue 2024-01-02 03:04:05 UTC` (weekday and zone name are decoration).
pub fn parse_systemd_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() || s == "n/a" {
        return None;
    }
    let mut fields = s.split_whitespace();
    let first = fields.next()?;
    // Weekday prefix is optional in older captures.
    let (date, time) = if first.contains('-') {
        (first, fields.next()?)
    } else {
        (fields.next()?, fields.next()?)
    };
    let naive =
        NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y-%m-%d %H:%M:%S").ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}
