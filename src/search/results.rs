//! Search results, sections and the result catalog

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One matching line.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    tag: String,
    source: PathBuf,
    line: u64,
    groups: Vec<Option<String>>,
}

impl SearchResult {
    pub(crate) fn new(tag: &str, source: &Path, line: u64, groups: Vec<Option<String>>) -> Self {
        Self {
            tag: tag.to_string(),
            source: source.to_path_buf(),
            line,
            groups,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// 1-based line number.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Captured group by 1-based position.
    pub fn group(&self, position: usize) -> Option<&str> {
        if position == 0 {
            return None;
        }
        self.groups.get(position - 1)?.as_deref()
    }

    pub fn groups(&self) -> &[Option<String>] {
        &self.groups
    }
}

/// Position of a sub-result within a sequence span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionPart {
    Start,
    Body,
    End,
}

impl SectionPart {
    pub fn suffix(&self) -> &'static str {
        match self {
            SectionPart::Start => "start",
            SectionPart::Body => "body",
            SectionPart::End => "end",
        }
    }
}

/// One matched sequence span: a start sub-result, any body sub-results
/// and an optional end, in scan order.
#[derive(Debug, Clone)]
pub struct Section {
    source: PathBuf,
    results: Vec<(SectionPart, SearchResult)>,
}

impl Section {
    pub(crate) fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            results: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, part: SectionPart, result: SearchResult) {
        self.results.push((part, result));
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn results(&self) -> &[(SectionPart, SearchResult)] {
        &self.results
    }

    pub fn start(&self) -> Option<&SearchResult> {
        self.results
            .iter()
            .find(|(p, _)| *p == SectionPart::Start)
            .map(|(_, r)| r)
    }

    pub fn body(&self) -> Vec<&SearchResult> {
        self.results
            .iter()
            .filter(|(p, _)| *p == SectionPart::Body)
            .map(|(_, r)| r)
            .collect()
    }

    pub fn end(&self) -> Option<&SearchResult> {
        self.results
            .iter()
            .find(|(p, _)| *p == SectionPart::End)
            .map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Everything one `search()` pass produced.
#[derive(Debug, Default)]
pub struct SearchCatalog {
    results: Vec<SearchResult>,
    sections: HashMap<String, Vec<Section>>,
}

impl SearchCatalog {
    pub(crate) fn push(&mut self, result: SearchResult) {
        self.results.push(result);
    }

    pub(crate) fn push_section(&mut self, tag: &str, section: Section) {
        self.sections.entry(tag.to_string()).or_default().push(section);
    }

    /// All results for a tag, across every scanned source, in scan order.
    pub fn by_tag(&self, tag: &str) -> Vec<&SearchResult> {
        self.results.iter().filter(|r| r.tag == tag).collect()
    }

    pub fn by_tag_and_source(&self, tag: &str, source: &Path) -> Vec<&SearchResult> {
        self.results
            .iter()
            .filter(|r| r.tag == tag && r.source == source)
            .collect()
    }

    /// Spans matched by a sequence definition, in order of appearance.
    pub fn sections_for(&self, tag: &str) -> &[Section] {
        self.sections.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}
