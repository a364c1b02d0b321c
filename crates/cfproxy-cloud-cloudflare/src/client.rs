//! Cloudflare v4 API client
//!
//! Bearer-token client implementing [`ProxyApi`]. Every request carries a
//! timeout, transient failures are retried with bounded backoff, and listings
//! follow `result_info.total_pages` up to a fixed page cap.

use crate::error::{CloudflareError, Result};
use crate::retry::{classify_status, classify_transport, retry_delay};
use crate::types::{
    ApiAccount, ApiDnsRecord, ApiResponse, ApiTokenVerify, ApiUser, ApiZone, PatchProxiedRequest,
    ResultInfo, join_errors,
};
use async_trait::async_trait;
use cfproxy_cloud::{
    AccessibleAccount, CloudError, DnsRecord, ProxyApi, RetryConfig, TokenInfo, Zone,
};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

const ZONES_PER_PAGE: u32 = 50;
const RECORDS_PER_PAGE: u32 = 100;
const ACCOUNTS_PER_PAGE: u32 = 50;
const MAX_PAGES: u32 = 1000;

type CloudResult<T> = std::result::Result<T, CloudError>;

/// Configuration for [`CloudflareClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Cloudflare API client shared by all accounts; the token is passed per call
pub struct CloudflareClient {
    http: reqwest::Client,
    api_base: String,
    retry: RetryConfig,
}

impl CloudflareClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api_base = config.api_base.trim_end_matches('/').to_string();
        if !(api_base.starts_with("https://") || api_base.starts_with("http://")) {
            return Err(CloudflareError::InvalidConfig(format!(
                "API base URL must start with http:// or https://, got '{}'",
                config.api_base
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("cfproxy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base,
            retry: config.retry,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// Send a request, rebuilding it for each retry of a transient failure
    async fn send<T, F>(&self, request: F) -> CloudResult<ApiResponse<T>>
    where
        T: DeserializeOwned + Send,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            match self.send_once(request()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = retry_delay(&self.retry, &e, attempt);
                    tracing::warn!(
                        "Request failed (attempt {}/{}), retrying in {:.1}s: {}",
                        attempt + 1,
                        self.retry.max_attempts + 1,
                        delay.as_secs_f64(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> CloudResult<ApiResponse<T>> {
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.map_err(classify_transport)?;
        tracing::debug!("Response status {}", status);

        if let Some(error) = classify_status(status, retry_after, error_message(&body)) {
            return Err(error);
        }

        let parsed: ApiResponse<T> = serde_json::from_str(&body)
            .map_err(|e| CloudError::ApiError(format!("Invalid response body: {}", e)))?;
        if !parsed.success {
            return Err(CloudError::ApiError(join_errors(&parsed.errors)));
        }
        Ok(parsed)
    }

    /// GET every page of a listing endpoint
    async fn get_all<T>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, String)],
        per_page: u32,
    ) -> CloudResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let url = self.endpoint(path);
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let response: ApiResponse<Vec<T>> = self
                .send(|| {
                    self.http
                        .get(&url)
                        .bearer_auth(token)
                        .query(query)
                        .query(&[("page", page), ("per_page", per_page)])
                })
                .await?;

            let batch = response.result.unwrap_or_default();
            let batch_len = batch.len();
            items.extend(batch);

            if !has_more_pages(page, response.result_info.as_ref(), batch_len, per_page) {
                tracing::debug!("Fetched {} item(s) from {} in {} page(s)", items.len(), path, page);
                return Ok(items);
            }
        }

        Err(CloudError::PageLimit(format!(
            "{} returned more than {} pages",
            path, MAX_PAGES
        )))
    }
}

/// Whether another page should be requested after `page`
///
/// An empty page always stops. With `total_pages` present it is followed;
/// without it, a full page implies there may be more.
fn has_more_pages(page: u32, info: Option<&ResultInfo>, batch_len: usize, per_page: u32) -> bool {
    if batch_len == 0 {
        return false;
    }
    match info.and_then(|i| i.total_pages) {
        Some(total) => page < total,
        None => batch_len >= per_page as usize,
    }
}

/// Best-effort message from an error body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiResponse<serde_json::Value>>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => join_errors(&parsed.errors),
        _ => body.chars().take(200).collect(),
    }
}

#[async_trait]
impl ProxyApi for CloudflareClient {
    fn name(&self) -> &str {
        "cloudflare"
    }

    async fn list_zones(&self, token: &str, account_id: Option<&str>) -> CloudResult<Vec<Zone>> {
        let query: Vec<(&str, String)> = account_id
            .map(|id| vec![("account.id", id.to_string())])
            .unwrap_or_default();
        let zones: Vec<ApiZone> = self.get_all(token, "zones", &query, ZONES_PER_PAGE).await?;
        Ok(zones.into_iter().map(Zone::from).collect())
    }

    async fn list_dns_records(&self, token: &str, zone: &Zone) -> CloudResult<Vec<DnsRecord>> {
        let path = format!("zones/{}/dns_records", zone.id);
        let records: Vec<ApiDnsRecord> = self.get_all(token, &path, &[], RECORDS_PER_PAGE).await?;
        Ok(records.into_iter().map(|r| r.into_record(zone)).collect())
    }

    async fn set_proxied(
        &self,
        token: &str,
        zone_id: &str,
        record_id: &str,
        proxied: bool,
    ) -> CloudResult<()> {
        let url = self.endpoint(&format!("zones/{}/dns_records/{}", zone_id, record_id));
        let body = PatchProxiedRequest { proxied };
        let _: ApiResponse<serde_json::Value> = self
            .send(|| self.http.patch(&url).bearer_auth(token).json(&body))
            .await?;
        Ok(())
    }

    async fn token_info(&self, token: &str) -> CloudResult<TokenInfo> {
        let url = self.endpoint("user/tokens/verify");
        let verified: ApiResponse<ApiTokenVerify> =
            self.send(|| self.http.get(&url).bearer_auth(token)).await?;
        let verified = verified
            .result
            .ok_or_else(|| CloudError::ApiError("Token verification returned no result".into()))?;

        // Account-owned tokens cannot read /user
        let user_url = self.endpoint("user");
        let email = match self
            .send::<ApiUser, _>(|| self.http.get(&user_url).bearer_auth(token))
            .await
        {
            Ok(user) => user.result.and_then(|u| u.email),
            Err(e) => {
                tracing::debug!("User lookup unavailable for token: {}", e);
                None
            }
        };

        Ok(TokenInfo {
            token_id: verified.id,
            status: verified.status,
            email,
        })
    }

    async fn list_accounts(&self, token: &str) -> CloudResult<Vec<AccessibleAccount>> {
        let accounts: Vec<ApiAccount> =
            self.get_all(token, "accounts", &[], ACCOUNTS_PER_PAGE).await?;
        Ok(accounts.into_iter().map(AccessibleAccount::from).collect())
    }
}
