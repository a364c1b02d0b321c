//! Zone and record scoping filters

use crate::error::{ConfigError, Result};
use regex::Regex;
use serde::Serialize;

/// `--zone` allow-list: each selector matches a zone ID exactly or a zone name
/// case-insensitively
#[derive(Debug, Clone, Default)]
pub struct ZoneFilter {
    selectors: Vec<String>,
}

impl ZoneFilter {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors
                .into_iter()
                .map(|s| s.into().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    pub fn matches(&self, zone_id: &str, zone_name: &str) -> bool {
        if self.selectors.is_empty() {
            return true;
        }
        let zone_name = zone_name.trim_end_matches('.');
        self.selectors.iter().any(|s| {
            s == zone_id || s.trim_end_matches('.').eq_ignore_ascii_case(zone_name)
        })
    }
}

/// `--include` / `--exclude` regex filters over record names
///
/// Both patterns use search semantics (unanchored unless the pattern anchors
/// itself). Exclude wins when both match.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl RecordFilter {
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self> {
        Ok(Self {
            include: include.map(|p| compile("--include", p)).transpose()?,
            exclude: exclude.map(|p| compile("--exclude", p)).transpose()?,
        })
    }

    pub fn matches(&self, record_name: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(record_name) {
                return false;
            }
        }
        match &self.include {
            Some(include) => include.is_match(record_name),
            None => true,
        }
    }

    pub fn include_pattern(&self) -> Option<&str> {
        self.include.as_ref().map(|r| r.as_str())
    }

    pub fn exclude_pattern(&self) -> Option<&str> {
        self.exclude.as_ref().map(|r| r.as_str())
    }
}

fn compile(flag: &'static str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        flag,
        pattern: pattern.to_string(),
        source,
    })
}

/// Everything that narrows a run below "all records of all accounts"
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub zones: ZoneFilter,
    pub records: RecordFilter,
}

impl Scope {
    pub fn new(zones: ZoneFilter, records: RecordFilter) -> Self {
        Self { zones, records }
    }

    /// Serializable description of the filters, for reports
    pub fn summary(&self, accounts: &[String]) -> ScopeSummary {
        ScopeSummary {
            accounts: accounts.to_vec(),
            zones: self.zones.selectors().to_vec(),
            include: self.records.include_pattern().map(str::to_string),
            exclude: self.records.exclude_pattern().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ScopeSummary {
    pub accounts: Vec<String>,
    pub zones: Vec<String>,
    pub include: Option<String>,
    pub exclude: Option<String>,
}
