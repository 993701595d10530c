//! Debian package version ordering
//!
//! Implements the dpkg comparison algorithm: `[epoch:]upstream[-revision]`
//! where `~` sorts before everything (including end of string), digit runs
//! compare numerically and letters sort before non-letters. Rule
//! definitions express version ranges against this ordering, never lexical
//! comparison.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed Debian package version.
#[derive(Debug, Clone)]
pub struct DpkgVersion {
    /// Epoch (0 when absent)
    pub epoch: u64,
    /// Upstream version part
    pub upstream: String,
    /// Debian revision part (empty when absent)
    pub revision: String,
}

impl DpkgVersion {
    /// Parse a version string. Epoch must be all digits to count as an
    /// epoch; otherwise the colon belongs to the upstream part.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty version string".to_string());
        }

        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) if !e.is_empty() && e.bytes().all(|b| b.is_ascii_digit()) => {
                (e.parse::<u64>().map_err(|e| e.to_string())?, rest)
            }
            _ => (0, s),
        };

        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((up, rev)) => (up.to_string(), rev.to_string()),
            None => (rest.to_string(), String::new()),
        };

        Ok(Self {
            epoch,
            upstream,
            revision,
        })
    }
}

impl FromStr for DpkgVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DpkgVersion::parse(s)
    }
}

impl fmt::Display for DpkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.upstream)?;
        if !self.revision.is_empty() {
            write!(f, "-{}", self.revision)?;
        }
        Ok(())
    }
}

impl PartialEq for DpkgVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DpkgVersion {}

impl PartialOrd for DpkgVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DpkgVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| verrevcmp(&self.upstream, &other.upstream))
            .then_with(|| verrevcmp(&self.revision, &other.revision))
    }
}

/// Weight of one character in the dpkg ordering. End of string weighs
/// zero so that `~` (weight -1) sorts before it.
fn char_order(c: Option<char>) -> i32 {
    match c {
        None => 0,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some('~') => -1,
        Some(c) => c as i32 + 256,
    }
}

/// dpkg's verrevcmp: alternate non-digit and digit segments, comparing
/// non-digits by character weight and digits numerically.
fn verrevcmp(a: &str, b: &str) -> Ordering {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        // Non-digit segment
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = char_order(a.get(i).copied());
            let bc = char_order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        // Digit segment: leading zeros are insignificant
        while a.get(i) == Some(&'0') {
            i += 1;
        }
        while b.get(j) == Some(&'0') {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;
        while i < a.len() && j < b.len() && a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }

        // The longer digit run is the larger number
        if i < a.len() && a[i].is_ascii_digit() {
            return Ordering::Greater;
        }
        if j < b.len() && b[j].is_ascii_digit() {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}
