//! Line-oriented text search over registered sources
//!
//! Definitions register against sources, then one `search()` call scans
//! every source exactly once, top to bottom, offering each line to every
//! definition registered for that source. A missing source yields zero
//! results and a debug log line, never an error.

pub mod results;
pub mod term;

pub use results::{SearchCatalog, SearchResult, Section, SectionPart};
pub use term::{SearchDef, SequenceDef};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

/// Accumulates registrations, then runs them in one pass per source.
#[derive(Debug, Default)]
pub struct FileSearcher {
    flat: Vec<SearchDef>,
    sequences: Vec<SequenceDef>,
    /// Scan order: sources in first-registration order, no duplicates.
    sources: Vec<PathBuf>,
    flat_for: HashMap<PathBuf, Vec<usize>>,
    seq_for: HashMap<PathBuf, Vec<usize>>,
}

impl FileSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flat term against a source. Repeatable: the same
    /// source can take many definitions and the same definition many
    /// sources.
    pub fn add(&mut self, def: &SearchDef, source: &Path) {
        let idx = self.flat.len();
        self.flat.push(def.clone());
        self.track_source(source);
        self.flat_for.entry(source.to_path_buf()).or_default().push(idx);
    }

    pub fn add_sequence(&mut self, def: &SequenceDef, source: &Path) {
        let idx = self.sequences.len();
        self.sequences.push(def.clone());
        self.track_source(source);
        self.seq_for.entry(source.to_path_buf()).or_default().push(idx);
    }

    fn track_source(&mut self, source: &Path) {
        if !self.sources.iter().any(|s| s == source) {
            self.sources.push(source.to_path_buf());
        }
    }

    pub fn has_registrations(&self) -> bool {
        !self.flat.is_empty() || !self.sequences.is_empty()
    }

    /// Scan every registered source once and collect all matches.
    pub fn search(&self) -> SearchCatalog {
        let mut catalog = SearchCatalog::default();
        for source in &self.sources {
            self.scan_source(source, &mut catalog);
        }
        catalog
    }

    fn scan_source(&self, source: &Path, catalog: &mut SearchCatalog) {
        let Ok(bytes) = fs::read(source) else {
            debug!("search source {} missing, skipping", source.display());
            return;
        };
        let content = String::from_utf8_lossy(&bytes);

        let flat: Vec<&SearchDef> = self
            .flat_for
            .get(source)
            .map(|ids| ids.iter().map(|&i| &self.flat[i]).collect())
            .unwrap_or_default();
        let mut scanners: Vec<SequenceScanner<'_>> = self
            .seq_for
            .get(source)
            .map(|ids| {
                ids.iter()
                    .map(|&i| SequenceScanner::new(&self.sequences[i], source))
                    .collect()
            })
            .unwrap_or_default();

        for (index, line) in content.lines().enumerate() {
            let line_no = index as u64 + 1;
            for def in &flat {
                if let Some(groups) = def.match_line(line) {
                    catalog.push(SearchResult::new(def.tag(), source, line_no, groups));
                }
            }
            for scanner in &mut scanners {
                scanner.step(line_no, line, catalog);
            }
        }

        // end of file closes any span still open
        for scanner in scanners {
            scanner.finish(catalog);
        }
    }
}

/// Per-(sequence, source) scan state: seeking a start, or inside an open
/// span collecting body lines until an end or the next start.
struct SequenceScanner<'a> {
    def: &'a SequenceDef,
    source: &'a Path,
    open: Option<Section>,
}

impl<'a> SequenceScanner<'a> {
    fn new(def: &'a SequenceDef, source: &'a Path) -> Self {
        Self {
            def,
            source,
            open: None,
        }
    }

    fn step(&mut self, line_no: u64, line: &str, catalog: &mut SearchCatalog) {
        // a new start always terminates the prior open span
        if let Some(groups) = self.def.start().match_line(line) {
            if let Some(section) = self.open.take() {
                catalog.push_section(self.def.tag(), section);
            }
            let mut section = Section::new(self.source);
            section.push(
                SectionPart::Start,
                self.result(SectionPart::Start, line_no, groups.clone(), catalog),
            );
            self.open = Some(section);
            return;
        }

        let Some(section) = &mut self.open else {
            return;
        };

        if let Some(end) = self.def.end() {
            if let Some(groups) = end.match_line(line) {
                let result = tagged_result(self.def.tag(), SectionPart::End, self.source, line_no, groups);
                catalog.push(result.clone());
                section.push(SectionPart::End, result);
                let section = self.open.take();
                if let Some(section) = section {
                    catalog.push_section(self.def.tag(), section);
                }
                return;
            }
        }

        if let Some(body) = self.def.body() {
            if let Some(groups) = body.match_line(line) {
                let result = tagged_result(self.def.tag(), SectionPart::Body, self.source, line_no, groups);
                catalog.push(result.clone());
                section.push(SectionPart::Body, result);
            }
        }
    }

    fn result(
        &self,
        part: SectionPart,
        line_no: u64,
        groups: Vec<Option<String>>,
        catalog: &mut SearchCatalog,
    ) -> SearchResult {
        let result = tagged_result(self.def.tag(), part, self.source, line_no, groups);
        catalog.push(result.clone());
        result
    }

    fn finish(self, catalog: &mut SearchCatalog) {
        if let Some(section) = self.open {
            catalog.push_section(self.def.tag(), section);
        }
    }
}

fn tagged_result(
    tag: &str,
    part: SectionPart,
    source: &Path,
    line_no: u64,
    groups: Vec<Option<String>>,
) -> SearchResult {
    SearchResult::new(&format!("{tag}-{}", part.suffix()), source, line_no, groups)
}
