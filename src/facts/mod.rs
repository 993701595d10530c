//! Fact sources the rule engine evaluates against
//!
//! Requirements never touch the snapshot directly; they go through the
//! small trait seams below so tests (and future live-host backends) can
//! substitute their own implementations. The shipped implementations parse
//! the well-known command output files of an unpacked support bundle.

pub mod collect;
pub mod configfile;
pub mod packages;
pub mod properties;
pub mod services;
pub mod version;

use version::DpkgVersion;

/// Installed deb packages.
pub trait PackageFacts {
    /// Installed version of a package, or None when not installed.
    fn installed_version(&self, name: &str) -> Option<DpkgVersion>;
}

/// Installed snaps.
pub trait SnapFacts {
    /// Whether a snap is present in the installed set.
    fn has_snap(&self, name: &str) -> bool;
}

/// Systemd service state.
pub trait ServiceFacts {
    /// Observed state of one service, or None when unknown to the system.
    fn service(&self, name: &str) -> Option<services::ServiceState>;
}
