//! Check parameters: match-count and time-window filters
//!
//! A search-backed check passes when its match count clears
//! `min-results` (default 1). `search-result-age-hours` narrows the
//! counted matches to those whose timestamp falls within the window
//! ending at the run's "now"; `search-period-hours` instead asks whether
//! any sliding window of that width holds enough matches. Timestamps are
//! read from the first captured group that parses as one; matches
//! without a parsable timestamp are excluded from windowed counting
//! only.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_yaml::Value;

use crate::error::DefinitionError;
use crate::search::SearchResult;

#[derive(Debug, Clone)]
pub struct CheckParameters {
    min_results: usize,
    age_hours: Option<i64>,
    period_hours: Option<i64>,
}

impl Default for CheckParameters {
    fn default() -> Self {
        Self {
            min_results: 1,
            age_hours: None,
            period_hours: None,
        }
    }
}

impl CheckParameters {
    pub fn parse(at: &str, value: &Value) -> Result<Self, DefinitionError> {
        let Value::Mapping(m) = value else {
            return Err(DefinitionError::invalid(
                at,
                "'check-parameters' must be a mapping",
            ));
        };
        let mut params = Self::default();
        for (k, v) in m {
            let Some(key) = k.as_str() else {
                return Err(DefinitionError::invalid(at, "parameter keys must be strings"));
            };
            match key {
                "min-results" => {
                    params.min_results = v.as_u64().ok_or_else(|| {
                        DefinitionError::invalid(at, "'min-results' must be a positive integer")
                    })? as usize;
                }
                "search-result-age-hours" => {
                    params.age_hours = Some(hours(at, key, v)?);
                }
                "search-period-hours" => {
                    params.period_hours = Some(hours(at, key, v)?);
                }
                other => {
                    return Err(DefinitionError::invalid(
                        at,
                        format!("unknown check parameter '{other}'"),
                    ));
                }
            }
        }
        Ok(params)
    }

    pub fn min_results(&self) -> usize {
        self.min_results
    }

    /// Whether a set of search results satisfies the parameters.
    pub fn satisfied(&self, results: &[&SearchResult], now: DateTime<Utc>) -> bool {
        if self.age_hours.is_none() && self.period_hours.is_none() {
            return results.len() >= self.min_results;
        }

        let mut stamps: Vec<DateTime<Utc>> = results
            .iter()
            .filter_map(|r| result_timestamp(r, now))
            .collect();
        stamps.sort_unstable();

        if let Some(age) = self.age_hours {
            let oldest = now - Duration::hours(age);
            stamps.retain(|s| *s >= oldest);
        }

        match self.period_hours {
            None => stamps.len() >= self.min_results,
            Some(period) => {
                if self.min_results == 0 {
                    return true;
                }
                let width = Duration::hours(period);
                // sorted, so checking each window anchored at a match
                // covers every candidate window
                stamps
                    .iter()
                    .enumerate()
                    .any(|(i, anchor)| {
                        stamps[i..].iter().take_while(|s| **s - *anchor <= width).count()
                            >= self.min_results
                    })
            }
        }
    }
}

fn hours(at: &str, key: &str, value: &Value) -> Result<i64, DefinitionError> {
    value
        .as_u64()
        .map(|n| n as i64)
        .ok_or_else(|| DefinitionError::invalid(at, format!("'{key}' must be a positive integer")))
}

/// Timestamp of a match, taken from the first captured group that
/// parses as one.
pub(crate) fn result_timestamp(result: &SearchResult, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    result
        .groups()
        .iter()
        .flatten()
        .find_map(|g| parse_log_timestamp(g, now))
}

/// Parse an ISO-8601 or syslog timestamp. Syslog lines carry no year;
/// the run's "now" supplies it.
pub(crate) fn parse_log_timestamp(s: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    // syslog: "Jan  2 03:04:05"
    let mut fields = s.split_whitespace();
    let (month, day, time) = (fields.next()?, fields.next()?, fields.next()?);
    let date = NaiveDate::parse_from_str(
        &format!("{} {} {}", now.year(), month, day),
        "%Y %b %d",
    )
    .ok()?;
    let naive = NaiveDateTime::parse_from_str(
        &format!("{} {}", date.format("%Y-%m-%d"), time),
        "%Y-%m-%d %H:%M:%S",
    )
    .ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}
