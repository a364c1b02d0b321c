//! Mutation engine
//!
//! Every record moves `UNKNOWN -> CAPTURED -> RECONCILED`. The `decide_*`
//! functions are pure and pick an outcome from what was observed; the
//! [`Engine`] applies them, persisting captures before any PATCH is sent.

use crate::action::{Outcome, RecordResult, SkipReason};
use crate::provider::{DnsRecord, ProxyApi, Zone};
use crate::state::{StateEntry, StateHandle, StateKey};
use cfproxy_config::Account;
use tracing::{error, info, warn};

/// What the engine intends to do with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    /// PATCH the record to `target`
    Apply { target: bool },
}

/// Decide `disable` for a record
pub fn decide_disable(record: &DnsRecord) -> Decision {
    if !record.is_proxiable() {
        return Decision::Skip(SkipReason::NotProxiable);
    }
    match record.proxied {
        Some(true) => Decision::Apply { target: false },
        _ => Decision::Skip(SkipReason::AlreadyDisabled),
    }
}

/// Decide `restore` for a record given its captured entry
pub fn decide_restore(record: &DnsRecord, entry: Option<&StateEntry>) -> Decision {
    if !record.is_proxiable() {
        return Decision::Skip(SkipReason::NotProxiable);
    }
    let Some(entry) = entry else {
        return Decision::Skip(SkipReason::NoPriorState);
    };
    if record.proxied == Some(entry.original_proxied) {
        Decision::Skip(SkipReason::AlreadyMatches)
    } else {
        Decision::Apply {
            target: entry.original_proxied,
        }
    }
}

/// Read-only `status` outcome
pub fn observe(record: &DnsRecord) -> Outcome {
    if record.is_proxiable() {
        Outcome::Observed
    } else {
        Outcome::skipped(SkipReason::NotProxiable)
    }
}

pub struct Engine<'a> {
    api: &'a dyn ProxyApi,
    state: &'a StateHandle,
    dry_run: bool,
}

impl<'a> Engine<'a> {
    pub fn new(api: &'a dyn ProxyApi, state: &'a StateHandle, dry_run: bool) -> Self {
        Self {
            api,
            state,
            dry_run,
        }
    }

    /// Turn off proxying for every proxied record of a zone
    ///
    /// All pending captures are saved in one write before the first PATCH.
    /// If that write fails, the zone's pending records are errors and no
    /// PATCH is sent.
    pub async fn disable_zone(
        &self,
        account: &Account,
        zone: &Zone,
        records: &[DnsRecord],
    ) -> Vec<RecordResult> {
        let decisions: Vec<Decision> = records.iter().map(decide_disable).collect();

        let mut capture_error = None;
        if !self.dry_run {
            let pending: Vec<&DnsRecord> = records
                .iter()
                .zip(&decisions)
                .filter(|(_, d)| matches!(d, Decision::Apply { .. }))
                .map(|(r, _)| r)
                .collect();
            if !pending.is_empty() {
                if let Err(e) = self.state.capture(&account.name, zone, &pending).await {
                    error!(
                        account = %account.name,
                        zone = %zone.name,
                        error = %e,
                        "Failed to persist captured state, leaving zone untouched"
                    );
                    capture_error = Some(e.to_string());
                }
            }
        }

        let mut results = Vec::with_capacity(records.len());
        for (record, decision) in records.iter().zip(decisions) {
            let prior = self.prior_value(record).await;
            let result = match decision {
                Decision::Skip(reason) => {
                    RecordResult::for_record(account, zone, record, Outcome::skipped(reason))
                }
                Decision::Apply { target } => match &capture_error {
                    Some(e) => RecordResult::for_record(
                        account,
                        zone,
                        record,
                        Outcome::error(format!("state capture failed, record not modified: {}", e)),
                    ),
                    None => self.apply(account, zone, record, target).await,
                },
            };
            results.push(result.with_prior(prior).with_dry_run(self.dry_run));
        }
        results
    }

    /// Return every record of a zone to its captured original
    pub async fn restore_zone(
        &self,
        account: &Account,
        zone: &Zone,
        records: &[DnsRecord],
    ) -> Vec<RecordResult> {
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let entry = self.state.entry(&StateKey::for_record(record)).await;
            let prior = entry.as_ref().map(|e| e.original_proxied);
            let result = match decide_restore(record, entry.as_ref()) {
                Decision::Skip(reason) => {
                    RecordResult::for_record(account, zone, record, Outcome::skipped(reason))
                }
                Decision::Apply { target } => self.apply(account, zone, record, target).await,
            };
            results.push(result.with_prior(prior).with_dry_run(self.dry_run));
        }
        results
    }

    /// Report current values alongside captured originals
    pub async fn status_zone(
        &self,
        account: &Account,
        zone: &Zone,
        records: &[DnsRecord],
    ) -> Vec<RecordResult> {
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let prior = self.prior_value(record).await;
            results.push(
                RecordResult::for_record(account, zone, record, observe(record)).with_prior(prior),
            );
        }
        results
    }

    async fn prior_value(&self, record: &DnsRecord) -> Option<bool> {
        self.state
            .entry(&StateKey::for_record(record))
            .await
            .map(|e| e.original_proxied)
    }

    async fn apply(
        &self,
        account: &Account,
        zone: &Zone,
        record: &DnsRecord,
        target: bool,
    ) -> RecordResult {
        if self.dry_run {
            info!(
                account = %account.name,
                zone = %zone.name,
                record = %record.name,
                action = "changed",
                "[dry-run] Would set proxied={}",
                target
            );
            return RecordResult::for_record(account, zone, record, Outcome::Changed)
                .with_new_proxied(target);
        }

        match self
            .api
            .set_proxied(&account.api_token, &zone.id, &record.id, target)
            .await
        {
            Ok(()) => {
                info!(
                    account = %account.name,
                    zone = %zone.name,
                    record = %record.name,
                    action = "changed",
                    "Set proxied={}",
                    target
                );
                RecordResult::for_record(account, zone, record, Outcome::Changed)
                    .with_new_proxied(target)
            }
            Err(e) => {
                warn!(
                    account = %account.name,
                    zone = %zone.name,
                    record = %record.name,
                    action = "error",
                    error = %e,
                    "Failed to set proxied={}",
                    target
                );
                RecordResult::for_record(account, zone, record, Outcome::error(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateStore;
    use crate::testing::MockApi;
    use chrono::Utc;
    use tempfile::tempdir;

    fn record(id: &str, proxied: Option<bool>, proxiable: Option<bool>) -> DnsRecord {
        DnsRecord {
            id: id.into(),
            zone_id: "z1".into(),
            name: format!("{}.example.com", id),
            record_type: "A".into(),
            content: "192.0.2.1".into(),
            proxied,
            proxiable,
        }
    }

    fn entry(original_proxied: bool) -> StateEntry {
        StateEntry {
            account: "prod".into(),
            zone_id: "z1".into(),
            zone_name: "example.com".into(),
            record_id: "r1".into(),
            record_name: "r1.example.com".into(),
            record_type: "A".into(),
            content: "192.0.2.1".into(),
            original_proxied,
            captured_at: Utc::now(),
        }
    }

    fn account() -> Account {
        Account::new("prod", "token-prod", Some("acc-1".into()))
    }

    fn zone() -> Zone {
        Zone::new("z1", "example.com")
    }

    async fn setup(dir: &std::path::Path) -> (MockApi, StateHandle) {
        let api = MockApi::new()
            .with_zone(Some("acc-1"), "z1", "example.com")
            .with_record("z1", "r1", "api.example.com", Some(true))
            .with_record("z1", "r2", "www.example.com", Some(false));
        let store = StateStore::new(dir.join("proxy_state.json"));
        let state = StateHandle::open(store).await.unwrap();
        (api, state)
    }

    #[test]
    fn test_decide_disable() {
        assert_eq!(
            decide_disable(&record("r1", Some(true), Some(true))),
            Decision::Apply { target: false }
        );
        assert_eq!(
            decide_disable(&record("r1", Some(false), Some(true))),
            Decision::Skip(SkipReason::AlreadyDisabled)
        );
        assert_eq!(
            decide_disable(&record("r1", Some(true), Some(false))),
            Decision::Skip(SkipReason::NotProxiable)
        );
        assert_eq!(
            decide_disable(&record("r1", None, None)),
            Decision::Skip(SkipReason::NotProxiable)
        );
    }

    #[test]
    fn test_decide_restore() {
        let rec = record("r1", Some(false), Some(true));
        assert_eq!(
            decide_restore(&rec, None),
            Decision::Skip(SkipReason::NoPriorState)
        );
        assert_eq!(
            decide_restore(&rec, Some(&entry(true))),
            Decision::Apply { target: true }
        );
        assert_eq!(
            decide_restore(&rec, Some(&entry(false))),
            Decision::Skip(SkipReason::AlreadyMatches)
        );
        assert_eq!(
            decide_restore(&record("r1", None, None), Some(&entry(true))),
            Decision::Skip(SkipReason::NotProxiable)
        );
    }

    #[tokio::test]
    async fn test_disable_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let (api, state) = setup(dir.path()).await;
        let engine = Engine::new(&api, &state, false);

        let records = api.records("z1");
        let first = engine.disable_zone(&account(), &zone(), &records).await;
        assert_eq!(first[0].outcome, Outcome::Changed);
        assert_eq!(first[0].new_proxied, Some(false));
        assert_eq!(
            first[1].skip_reason(),
            Some(SkipReason::AlreadyDisabled)
        );
        let after_first = state.snapshot().await.entries;

        let records = api.records("z1");
        let second = engine.disable_zone(&account(), &zone(), &records).await;
        assert_eq!(
            second[0].skip_reason(),
            Some(SkipReason::AlreadyDisabled)
        );
        assert_eq!(state.snapshot().await.entries, after_first);
        assert_eq!(api.patch_count(), 1);
    }

    #[tokio::test]
    async fn test_unproxied_records_are_not_captured() {
        let dir = tempdir().unwrap();
        let (api, state) = setup(dir.path()).await;
        let engine = Engine::new(&api, &state, false);

        let records = api.records("z1");
        engine.disable_zone(&account(), &zone(), &records).await;

        let snapshot = state.snapshot().await;
        assert!(snapshot.get(&StateKey::new("z1", "r1")).is_some());
        assert!(snapshot.get(&StateKey::new("z1", "r2")).is_none());
    }

    #[tokio::test]
    async fn test_disable_then_restore_roundtrip() {
        let dir = tempdir().unwrap();
        let (api, state) = setup(dir.path()).await;
        let engine = Engine::new(&api, &state, false);

        let records = api.records("z1");
        engine.disable_zone(&account(), &zone(), &records).await;
        assert_eq!(api.proxied("z1", "r1"), Some(false));

        let records = api.records("z1");
        let restored = engine.restore_zone(&account(), &zone(), &records).await;
        assert_eq!(restored[0].outcome, Outcome::Changed);
        assert_eq!(restored[0].new_proxied, Some(true));
        assert_eq!(restored[1].skip_reason(), Some(SkipReason::NoPriorState));
        assert_eq!(api.proxied("z1", "r1"), Some(true));

        let records = api.records("z1");
        let again = engine.restore_zone(&account(), &zone(), &records).await;
        assert_eq!(again[0].skip_reason(), Some(SkipReason::AlreadyMatches));
        assert!(state.entry(&StateKey::new("z1", "r1")).await.is_some());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_state_file_untouched() {
        let dir = tempdir().unwrap();
        let (api, state) = setup(dir.path()).await;

        // Seed a file so byte-identity is meaningful
        let seeded = Engine::new(&api, &state, false);
        let records = api.records("z1");
        seeded.disable_zone(&account(), &zone(), &records).await;
        api.set("z1", "r1", true);
        let api = api.with_record("z1", "r3", "new.example.com", Some(true));
        let before = std::fs::read(state.store().path()).unwrap();

        let engine = Engine::new(&api, &state, true);
        let records = api.records("z1");
        let results = engine.disable_zone(&account(), &zone(), &records).await;

        assert!(results.iter().all(|r| r.dry_run));
        assert_eq!(results[2].outcome, Outcome::Changed);
        assert_eq!(results[2].new_proxied, Some(false));
        assert_eq!(std::fs::read(state.store().path()).unwrap(), before);
        assert_eq!(api.proxied("z1", "r3"), Some(true));
        assert!(state.entry(&StateKey::new("z1", "r3")).await.is_none());
    }

    #[tokio::test]
    async fn test_capture_failure_sends_no_patch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proxy_state.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), "x").unwrap();

        let api = MockApi::new()
            .with_zone(Some("acc-1"), "z1", "example.com")
            .with_record("z1", "r1", "api.example.com", Some(true));
        let state = StateHandle::with_state(StateStore::new(&path), Default::default());

        let engine = Engine::new(&api, &state, false);
        let records = api.records("z1");
        let results = engine.disable_zone(&account(), &zone(), &records).await;

        assert!(results[0].outcome.is_error());
        assert!(
            results[0]
                .error_message()
                .unwrap()
                .contains("state capture failed")
        );
        assert_eq!(api.patch_count(), 0);
        assert_eq!(api.proxied("z1", "r1"), Some(true));
    }

    #[tokio::test]
    async fn test_patch_failure_keeps_capture() {
        let dir = tempdir().unwrap();
        let (api, state) = setup(dir.path()).await;
        api.fail_patch("r1");
        let engine = Engine::new(&api, &state, false);

        let records = api.records("z1");
        let results = engine.disable_zone(&account(), &zone(), &records).await;

        assert!(results[0].outcome.is_error());
        assert_eq!(results[0].new_proxied, Some(true));
        let entry = state.entry(&StateKey::new("z1", "r1")).await.unwrap();
        assert!(entry.original_proxied);
    }

    #[tokio::test]
    async fn test_status_reports_prior_state() {
        let dir = tempdir().unwrap();
        let (api, state) = setup(dir.path()).await;
        let engine = Engine::new(&api, &state, false);
        let records = api.records("z1");
        engine.disable_zone(&account(), &zone(), &records).await;
        let patches = api.patch_count();

        let records = api.records("z1");
        let status = engine.status_zone(&account(), &zone(), &records).await;
        assert_eq!(status[0].outcome, Outcome::Observed);
        assert!(status[0].has_prior_state);
        assert_eq!(status[0].prior_value, Some(true));
        assert_eq!(status[0].previous_proxied, Some(false));
        assert!(!status[1].has_prior_state);
        assert_eq!(api.patch_count(), patches);
    }
}
