//! Cloudflare v4 API wire types

use cfproxy_cloud::{AccessibleAccount, DnsRecord, Zone};
use serde::{Deserialize, Serialize};

/// Standard v4 envelope
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

/// Joins envelope errors into one message
pub(crate) fn join_errors(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "Unknown error".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} (code {})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultInfo {
    pub total_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiZone {
    id: String,
    name: String,
}

impl From<ApiZone> for Zone {
    fn from(zone: ApiZone) -> Self {
        Zone::new(zone.id, zone.name)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiDnsRecord {
    id: String,
    zone_id: Option<String>,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    content: String,
    proxied: Option<bool>,
    proxiable: Option<bool>,
}

impl ApiDnsRecord {
    pub fn into_record(self, zone: &Zone) -> DnsRecord {
        DnsRecord {
            id: self.id,
            zone_id: self.zone_id.unwrap_or_else(|| zone.id.clone()),
            name: self.name,
            record_type: self.record_type,
            content: self.content,
            proxied: self.proxied,
            proxiable: self.proxiable,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiTokenVerify {
    pub id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiUser {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiAccount {
    id: String,
    name: String,
    #[serde(rename = "type")]
    account_type: Option<String>,
}

impl From<ApiAccount> for AccessibleAccount {
    fn from(account: ApiAccount) -> Self {
        AccessibleAccount {
            id: account.id,
            name: account.name,
            account_type: account.account_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PatchProxiedRequest {
    pub proxied: bool,
}
