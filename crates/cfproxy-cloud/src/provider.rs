//! DNS API collaborator trait and the records it returns

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote DNS API consumed by the enumerator, engine and verifier
///
/// Listing methods must exhaust pagination. Implementations own retry and
/// timeout handling; an `Err` returned here is final for that unit of work.
#[async_trait]
pub trait ProxyApi: Send + Sync {
    /// Returns the provider name (e.g., "cloudflare")
    fn name(&self) -> &str;

    /// List zones visible to the token, optionally filtered server-side by account ID
    async fn list_zones(&self, token: &str, account_id: Option<&str>) -> Result<Vec<Zone>>;

    /// List every DNS record of a zone
    async fn list_dns_records(&self, token: &str, zone: &Zone) -> Result<Vec<DnsRecord>>;

    /// Set the proxied flag of a single record
    async fn set_proxied(
        &self,
        token: &str,
        zone_id: &str,
        record_id: &str,
        proxied: bool,
    ) -> Result<()>;

    /// Describe the token itself (used by `verify`)
    async fn token_info(&self, token: &str) -> Result<TokenInfo>;

    /// List the accounts the token can access (used by `verify`)
    async fn list_accounts(&self, token: &str) -> Result<Vec<AccessibleAccount>>;
}

/// A DNS zone as listed by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

impl Zone {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A DNS record. Only `proxied` is ever mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    pub zone_id: String,
    pub name: String,
    pub record_type: String,
    pub content: String,

    /// `None` when the API does not report the flag for this record
    pub proxied: Option<bool>,

    /// `Some(false)` when the API says the record cannot be proxied
    pub proxiable: Option<bool>,
}

impl DnsRecord {
    /// Records without a proxied flag, or explicitly marked unproxiable, are never touched
    pub fn is_proxiable(&self) -> bool {
        self.proxied.is_some() && self.proxiable != Some(false)
    }
}

/// Token identity as reported by the API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenInfo {
    pub token_id: Option<String>,
    pub status: Option<String>,
    pub email: Option<String>,
}

/// An account reachable with a given token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessibleAccount {
    pub id: String,
    pub name: String,
    pub account_type: Option<String>,
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Exponential backoff for the given zero-based retry attempt, capped at `max_delay`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt.min(32) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(proxied: Option<bool>, proxiable: Option<bool>) -> DnsRecord {
        DnsRecord {
            id: "r1".into(),
            zone_id: "z1".into(),
            name: "api.example.com".into(),
            record_type: "A".into(),
            content: "192.0.2.1".into(),
            proxied,
            proxiable,
        }
    }

    #[test]
    fn test_is_proxiable() {
        assert!(record(Some(true), Some(true)).is_proxiable());
        assert!(record(Some(false), None).is_proxiable());
        assert!(!record(Some(false), Some(false)).is_proxiable());
        assert!(!record(None, None).is_proxiable());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(0), Duration::from_millis(500));
        assert_eq!(retry.backoff(1), Duration::from_secs(1));
        assert_eq!(retry.backoff(2), Duration::from_secs(2));
        assert_eq!(retry.backoff(20), Duration::from_secs(30));
    }

    #[test]
    fn test_with_max_attempts() {
        let retry = RetryConfig::default().with_max_attempts(0);
        assert_eq!(retry.max_attempts, 0);
    }
}
