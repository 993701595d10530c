//! Compiled search terms

use regex::Regex;

use crate::error::DefinitionError;

/// A flat search term: tagged pattern alternatives plus an optional
/// cheap pre-filter. Patterns compile here, so a malformed definition
/// fails at load, never mid-scan.
#[derive(Debug, Clone)]
pub struct SearchDef {
    tag: String,
    patterns: Vec<Regex>,
    hint: Option<Regex>,
}

impl SearchDef {
    pub fn new(tag: &str, patterns: &[String], hint: Option<&str>) -> Result<Self, DefinitionError> {
        let patterns = patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        let hint = match hint {
            Some(h) => Some(compile(h)?),
            None => None,
        };
        Ok(Self {
            tag: tag.to_string(),
            patterns,
            hint,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Match one line. The hint gates the full pattern list; the first
    /// matching alternative wins. Returns the captured groups.
    pub(crate) fn match_line(&self, line: &str) -> Option<Vec<Option<String>>> {
        if let Some(hint) = &self.hint {
            if !hint.is_match(line) {
                return None;
            }
        }
        for pattern in &self.patterns {
            if let Some(caps) = pattern.captures(line) {
                let groups = caps
                    .iter()
                    .skip(1)
                    .map(|m| m.map(|m| m.as_str().to_string()))
                    .collect();
                return Some(groups);
            }
        }
        None
    }
}

/// A start/body/end sequence. Body and end are optional: without an end
/// pattern a span runs until the next start or end of file.
#[derive(Debug, Clone)]
pub struct SequenceDef {
    tag: String,
    start: SearchDef,
    body: Option<SearchDef>,
    end: Option<SearchDef>,
}

impl SequenceDef {
    pub fn new(tag: &str, start: SearchDef, body: Option<SearchDef>, end: Option<SearchDef>) -> Self {
        Self {
            tag: tag.to_string(),
            start,
            body,
            end,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub(crate) fn start(&self) -> &SearchDef {
        &self.start
    }

    pub(crate) fn body(&self) -> Option<&SearchDef> {
        self.body.as_ref()
    }

    pub(crate) fn end(&self) -> Option<&SearchDef> {
        self.end.as_ref()
    }
}

fn compile(pattern: &str) -> Result<Regex, DefinitionError> {
    Regex::new(pattern).map_err(|source| DefinitionError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}
