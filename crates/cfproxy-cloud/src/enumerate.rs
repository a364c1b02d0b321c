//! Zone and record enumeration with scope filters applied

use crate::error::Result;
use crate::provider::{DnsRecord, ProxyApi, Zone};
use cfproxy_config::{Account, Scope};

pub struct Enumerator<'a> {
    api: &'a dyn ProxyApi,
    scope: &'a Scope,
}

impl<'a> Enumerator<'a> {
    pub fn new(api: &'a dyn ProxyApi, scope: &'a Scope) -> Self {
        Self { api, scope }
    }

    /// Zones of an account in API order, narrowed by `--zone`
    pub async fn list_zones(&self, account: &Account) -> Result<Vec<Zone>> {
        if account.account_id.is_none() {
            tracing::warn!(
                account = %account.name,
                "No account ID configured, listing every zone the token can see"
            );
        }

        let zones = self
            .api
            .list_zones(&account.api_token, account.account_id.as_deref())
            .await?;
        let total = zones.len();
        let zones: Vec<Zone> = zones
            .into_iter()
            .filter(|z| self.scope.zones.matches(&z.id, &z.name))
            .collect();

        tracing::info!(
            account = %account.name,
            "Found {} zone(s), {} in scope",
            total,
            zones.len()
        );
        Ok(zones)
    }

    /// Every record of a zone, narrowed by `--include` / `--exclude`
    pub async fn list_records(&self, account: &Account, zone: &Zone) -> Result<Vec<DnsRecord>> {
        let records = self.api.list_dns_records(&account.api_token, zone).await?;
        let total = records.len();
        let records: Vec<DnsRecord> = records
            .into_iter()
            .filter(|r| self.scope.records.matches(&r.name))
            .collect();

        tracing::debug!(
            account = %account.name,
            zone = %zone.name,
            "Found {} record(s), {} in scope",
            total,
            records.len()
        );
        Ok(records)
    }
}
