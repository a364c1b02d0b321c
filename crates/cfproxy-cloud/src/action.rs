//! Per-record outcomes and run-level aggregation

use crate::provider::{DnsRecord, Zone};
use cfproxy_config::Account;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level operation of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Disable,
    Restore,
    Status,
    Verify,
}

impl Verb {
    /// Whether the verb may issue PATCH requests
    pub fn is_mutating(&self) -> bool {
        matches!(self, Verb::Disable | Verb::Restore)
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verb::Disable => write!(f, "disable"),
            Verb::Restore => write!(f, "restore"),
            Verb::Status => write!(f, "status"),
            Verb::Verify => write!(f, "verify"),
        }
    }
}

/// Why a record was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// `disable` found the record already unproxied
    AlreadyDisabled,
    /// `restore` found no captured original for the record
    NoPriorState,
    /// `restore` found the record already at its captured original
    AlreadyMatches,
    /// The API does not allow proxying this record
    NotProxiable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyDisabled => write!(f, "already_disabled"),
            SkipReason::NoPriorState => write!(f, "no_prior_state"),
            SkipReason::AlreadyMatches => write!(f, "already_matches"),
            SkipReason::NotProxiable => write!(f, "not_proxiable"),
        }
    }
}

/// What happened to a record (or to the zone/account a row stands for)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Outcome {
    /// The flag was changed, or would have been in a dry run
    Changed,
    Skipped { reason: SkipReason },
    Error { error: String },
    /// Read-only observation (`status`)
    Observed,
}

impl Outcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Outcome::Skipped { reason }
    }

    pub fn error(error: impl std::fmt::Display) -> Self {
        Outcome::Error {
            error: error.to_string(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Outcome::Changed => ActionKind::Changed,
            Outcome::Skipped { .. } => ActionKind::Skipped,
            Outcome::Error { .. } => ActionKind::Error,
            Outcome::Observed => ActionKind::Observed,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Changed,
    Skipped,
    Error,
    Observed,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Changed => write!(f, "changed"),
            ActionKind::Skipped => write!(f, "skipped"),
            ActionKind::Error => write!(f, "error"),
            ActionKind::Observed => write!(f, "observed"),
        }
    }
}

/// One row of a run: a record, or a zone/account that failed before its
/// records could be listed (record fields are then `None`)
#[derive(Debug, Clone, Serialize)]
pub struct RecordResult {
    pub account: String,
    pub account_id: Option<String>,
    pub zone_id: Option<String>,
    pub zone_name: Option<String>,
    pub record_id: Option<String>,
    pub record_name: Option<String>,
    pub record_type: Option<String>,
    pub content: Option<String>,
    pub previous_proxied: Option<bool>,
    pub new_proxied: Option<bool>,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub dry_run: bool,

    /// Whether the state file holds a captured original for this record
    pub has_prior_state: bool,
    pub prior_value: Option<bool>,
}

impl RecordResult {
    pub fn for_record(account: &Account, zone: &Zone, record: &DnsRecord, outcome: Outcome) -> Self {
        Self {
            account: account.name.clone(),
            account_id: account.account_id.clone(),
            zone_id: Some(zone.id.clone()),
            zone_name: Some(zone.name.clone()),
            record_id: Some(record.id.clone()),
            record_name: Some(record.name.clone()),
            record_type: Some(record.record_type.clone()),
            content: Some(record.content.clone()),
            previous_proxied: record.proxied,
            new_proxied: record.proxied,
            outcome,
            dry_run: false,
            has_prior_state: false,
            prior_value: None,
        }
    }

    /// Row for a zone whose records could not be listed
    pub fn zone_error(account: &Account, zone: &Zone, error: impl std::fmt::Display) -> Self {
        Self {
            zone_id: Some(zone.id.clone()),
            zone_name: Some(zone.name.clone()),
            ..Self::account_error(account, error)
        }
    }

    /// Row for an account whose zones could not be listed
    pub fn account_error(account: &Account, error: impl std::fmt::Display) -> Self {
        Self {
            account: account.name.clone(),
            account_id: account.account_id.clone(),
            zone_id: None,
            zone_name: None,
            record_id: None,
            record_name: None,
            record_type: None,
            content: None,
            previous_proxied: None,
            new_proxied: None,
            outcome: Outcome::error(error),
            dry_run: false,
            has_prior_state: false,
            prior_value: None,
        }
    }

    pub fn with_new_proxied(mut self, proxied: bool) -> Self {
        self.new_proxied = Some(proxied);
        self
    }

    pub fn with_prior(mut self, prior_value: Option<bool>) -> Self {
        self.has_prior_state = prior_value.is_some();
        self.prior_value = prior_value;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self.outcome {
            Outcome::Skipped { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error { error } => Some(error),
            _ => None,
        }
    }
}

/// Result of a whole run, across all accounts
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub verb: Verb,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Stopped early by Ctrl-C; `results` covers the zones that finished
    pub interrupted: bool,
    pub results: Vec<RecordResult>,
}

impl RunResult {
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|r| r.outcome.is_error())
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Counts per action, with skips broken down by reason
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub changed: usize,
    pub skipped: usize,
    pub error: usize,
    pub observed: usize,
    pub skipped_by_reason: BTreeMap<SkipReason, usize>,
}

impl RunSummary {
    pub fn from_results(results: &[RecordResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match &result.outcome {
                Outcome::Changed => summary.changed += 1,
                Outcome::Skipped { reason } => {
                    summary.skipped += 1;
                    *summary.skipped_by_reason.entry(*reason).or_insert(0) += 1;
                }
                Outcome::Error { .. } => summary.error += 1,
                Outcome::Observed => summary.observed += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.changed + self.skipped + self.error + self.observed
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} changed, {} skipped, {} error(s)",
            self.changed, self.skipped, self.error
        )?;
        if self.observed > 0 {
            write!(f, ", {} observed", self.observed)?;
        }
        Ok(())
    }
}
