//! Package facts parsed from snapshot command output
//!
//! Deb packages come from `sos_commands/dpkg/dpkg_-l`, snaps from
//! `sos_commands/snap/snap_list_--all` (with a fallback to the plain
//! `snap_list` capture). Both parse lazily on first use and keep the
//! parsed table for the rest of the run.

use super::version::DpkgVersion;
use super::{PackageFacts, SnapFacts};
use log::debug;
use once_cell::unsync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const DPKG_LIST: &str = "sos_commands/dpkg/dpkg_-l";
const SNAP_LIST_CANDIDATES: &[&str] = &[
    "sos_commands/snap/snap_list_--all",
    "sos_commands/snap/snap_list",
];

/// Deb package table backed by a snapshot's `dpkg -l` capture.
pub struct SnapshotPackages {
    data_root: PathBuf,
    table: OnceCell<HashMap<String, DpkgVersion>>,
}

impl SnapshotPackages {
    pub fn new(data_root: &Path) -> Self {
        Self {
            data_root: data_root.to_path_buf(),
            table: OnceCell::new(),
        }
    }

    fn table(&self) -> &HashMap<String, DpkgVersion> {
        self.table.get_or_init(|| {
            let path = self.data_root.join(DPKG_LIST);
            match fs::read_to_string(&path) {
                Ok(content) => parse_dpkg_list(&content),
                Err(_) => {
                    debug!("no dpkg list at {}", path.display());
                    HashMap::new()
                }
            }
        })
    }
}

impl PackageFacts for SnapshotPackages {
    fn installed_version(&self, name: &str) -> Option<DpkgVersion> {
        self.table().get(name).cloned()
    }
}

/// Parse `dpkg -l` output into name -> version for installed packages.
fn parse_dpkg_list(content: &str) -> HashMap<String, DpkgVersion> {
    let mut table = HashMap::new();
    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let (Some(status), Some(name), Some(version)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        // Second status char 'i' covers ii (installed) and hi (held).
        if status.len() != 2 || status.as_bytes()[1] != b'i' {
            continue;
        }
        // Arch-qualified names like libssl1.1:amd64 index by base name.
        let name = name.split(':').next().unwrap_or(name);
        match DpkgVersion::parse(version) {
            Ok(v) => {
                table.insert(name.to_string(), v);
            }
            Err(e) => debug!("skipping unparsable version for {}: {}", name, e),
        }
    }
    table
}

/// Snap presence backed by a snapshot's `snap list` capture.
pub struct SnapshotSnaps {
    data_root: PathBuf,
    names: OnceCell<HashSet<String>>,
}

impl SnapshotSnaps {
    pub fn new(data_root: &Path) -> Self {
        Self {
            data_root: data_root.to_path_buf(),
            names: OnceCell::new(),
        }
    }

    fn names(&self) -> &HashSet<String> {
        self.names.get_or_init(|| {
            for candidate in SNAP_LIST_CANDIDATES {
                let path = self.data_root.join(candidate);
                if let Ok(content) = fs::read_to_string(&path) {
                    return parse_snap_list(&content);
                }
            }
            debug!("no snap list under {}", self.data_root.display());
            HashSet::new()
        })
    }
}

impl SnapFacts for SnapshotSnaps {
    fn has_snap(&self, name: &str) -> bool {
        self.names().contains(name)
    }
}

fn parse_snap_list(content: &str) -> HashSet<String> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|first| !first.is_empty() && *first != "Name")
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DPKG_SAMPLE: &str = "\
Desired=Unknown/Install/Remove/Purge/Hold
| Status=Not/Inst/Conf-files/Unpacked/halF-conf/Half-inst/trig-aWait/Trig-pend
|/ Err?=(none)/Reinst-required (Status,Err: uppercase=bad)
||/ Name              Version                 Architecture Description
+++-=================-=======================-============-==============
ii  openssh-server    1:8.2p1-4ubuntu0.5      amd64        secure shell server
ii  libssl1.1:amd64   1.1.1f-1ubuntu2.16      amd64        SSL shared libraries
rc  old-package       0.9-1                   amd64        removed, config remains
hi  pinned-tool       2.0-1                   amd64        held package
";

    #[test]
    fn test_parse_dpkg_list() {
        let table = parse_dpkg_list(DPKG_SAMPLE);
        assert_eq!(
            table.get("openssh-server"),
            Some(&DpkgVersion::parse("1:8.2p1-4ubuntu0.5").unwrap())
        );
        // arch suffix stripped
        assert!(table.contains_key("libssl1.1"));
        // removed package excluded, held package included
        assert!(!table.contains_key("old-package"));
        assert!(table.contains_key("pinned-tool"));
    }

    #[test]
    fn test_parse_snap_list() {
        let names = parse_snap_list(
            "Name      Version   Rev    Tracking       Publisher   Notes\n\
             core20    20240111  2182   latest/stable  canonical   base\n\
             microk8s  v1.28.3   6089   1.28/stable    canonical   classic\n",
        );
        assert!(names.contains("core20"));
        assert!(names.contains("microk8s"));
        assert!(!names.contains("Name"));
    }

    #[test]
    fn test_missing_files_yield_empty_facts() {
        let packages = SnapshotPackages::new(Path::new("/nonexistent/root"));
        assert!(packages.installed_version("anything").is_none());

        let snaps = SnapshotSnaps::new(Path::new("/nonexistent/root"));
        assert!(!snaps.has_snap("anything"));
    }
}
