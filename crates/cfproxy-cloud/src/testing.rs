//! In-memory `ProxyApi` for tests

use crate::error::{CloudError, Result};
use crate::provider::{AccessibleAccount, DnsRecord, ProxyApi, TokenInfo, Zone};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// Injectable failure point
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FailPoint {
    ListZones(String),
    ListRecords(String),
    Patch(String),
    TokenInfo(String),
}

#[derive(Default)]
struct Inner {
    /// `(account_id, zone)` in API order
    zones: Vec<(Option<String>, Zone)>,
    records: Vec<DnsRecord>,
    accounts: Vec<AccessibleAccount>,
    failures: HashSet<FailPoint>,
    patches: Vec<(String, String, bool)>,
}

/// In-memory DNS API with failure injection
///
/// Zones are filtered by account ID when one is requested. Records mutate in
/// place on `set_proxied`, so a later listing sees the new value.
#[derive(Default)]
pub struct MockApi {
    inner: Mutex<Inner>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_zone(self, account_id: Option<&str>, id: &str, name: &str) -> Self {
        self.lock()
            .zones
            .push((account_id.map(str::to_string), Zone::new(id, name)));
        self
    }

    pub fn with_record(self, zone_id: &str, id: &str, name: &str, proxied: Option<bool>) -> Self {
        self.lock().records.push(DnsRecord {
            id: id.to_string(),
            zone_id: zone_id.to_string(),
            name: name.to_string(),
            record_type: "A".to_string(),
            content: "192.0.2.1".to_string(),
            proxied,
            proxiable: proxied.map(|_| true),
        });
        self
    }

    pub fn with_unproxiable_record(self, zone_id: &str, id: &str, name: &str) -> Self {
        self.lock().records.push(DnsRecord {
            id: id.to_string(),
            zone_id: zone_id.to_string(),
            name: name.to_string(),
            record_type: "TXT".to_string(),
            content: "v=spf1 -all".to_string(),
            proxied: Some(false),
            proxiable: Some(false),
        });
        self
    }

    pub fn with_account(self, id: &str, name: &str) -> Self {
        self.lock().accounts.push(AccessibleAccount {
            id: id.to_string(),
            name: name.to_string(),
            account_type: Some("standard".to_string()),
        });
        self
    }

    /// Fail zone listing for a token
    pub fn fail_list_zones(&self, token: &str) {
        self.lock()
            .failures
            .insert(FailPoint::ListZones(token.to_string()));
    }

    pub fn fail_list_records(&self, zone_id: &str) {
        self.lock()
            .failures
            .insert(FailPoint::ListRecords(zone_id.to_string()));
    }

    pub fn fail_patch(&self, record_id: &str) {
        self.lock()
            .failures
            .insert(FailPoint::Patch(record_id.to_string()));
    }

    pub fn fail_token_info(&self, token: &str) {
        self.lock()
            .failures
            .insert(FailPoint::TokenInfo(token.to_string()));
    }

    /// Current records of a zone, as a listing would return them
    pub fn records(&self, zone_id: &str) -> Vec<DnsRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.zone_id == zone_id)
            .cloned()
            .collect()
    }

    pub fn proxied(&self, zone_id: &str, record_id: &str) -> Option<bool> {
        self.lock()
            .records
            .iter()
            .find(|r| r.zone_id == zone_id && r.id == record_id)
            .and_then(|r| r.proxied)
    }

    /// Change a record behind the engine's back
    pub fn set(&self, zone_id: &str, record_id: &str, proxied: bool) {
        if let Some(record) = self
            .lock()
            .records
            .iter_mut()
            .find(|r| r.zone_id == zone_id && r.id == record_id)
        {
            record.proxied = Some(proxied);
        }
    }

    pub fn patch_count(&self) -> usize {
        self.lock().patches.len()
    }

    fn check(&self, point: FailPoint) -> Result<()> {
        if self.lock().failures.contains(&point) {
            return Err(CloudError::Http {
                status: 500,
                message: format!("injected failure: {:?}", point),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProxyApi for MockApi {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_zones(&self, token: &str, account_id: Option<&str>) -> Result<Vec<Zone>> {
        self.check(FailPoint::ListZones(token.to_string()))?;
        Ok(self
            .lock()
            .zones
            .iter()
            .filter(|(acc, _)| account_id.is_none() || acc.as_deref() == account_id)
            .map(|(_, zone)| zone.clone())
            .collect())
    }

    async fn list_dns_records(&self, _token: &str, zone: &Zone) -> Result<Vec<DnsRecord>> {
        self.check(FailPoint::ListRecords(zone.id.clone()))?;
        Ok(self.records(&zone.id))
    }

    async fn set_proxied(
        &self,
        _token: &str,
        zone_id: &str,
        record_id: &str,
        proxied: bool,
    ) -> Result<()> {
        self.check(FailPoint::Patch(record_id.to_string()))?;
        let mut inner = self.lock();
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.zone_id == zone_id && r.id == record_id)
            .ok_or_else(|| CloudError::Http {
                status: 404,
                message: format!("record {} not found", record_id),
            })?;
        record.proxied = Some(proxied);
        inner
            .patches
            .push((zone_id.to_string(), record_id.to_string(), proxied));
        Ok(())
    }

    async fn token_info(&self, token: &str) -> Result<TokenInfo> {
        self.check(FailPoint::TokenInfo(token.to_string()))?;
        Ok(TokenInfo {
            token_id: Some(format!("id-{}", token)),
            status: Some("active".to_string()),
            email: None,
        })
    }

    async fn list_accounts(&self, _token: &str) -> Result<Vec<AccessibleAccount>> {
        Ok(self.lock().accounts.clone())
    }
}
