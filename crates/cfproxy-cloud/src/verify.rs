//! Credential and account-ID verification

use crate::provider::{AccessibleAccount, ProxyApi, TokenInfo};
use cfproxy_config::Account;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;

/// What `verify` found out about one configured account
#[derive(Debug, Clone, Serialize)]
pub struct AccountVerification {
    pub account: String,
    pub configured_account_id: Option<String>,
    pub token: Option<TokenInfo>,
    pub accessible_accounts: Vec<AccessibleAccount>,

    /// `None` when no account ID is configured
    pub account_id_valid: Option<bool>,

    pub error: Option<String>,
}

impl AccountVerification {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.account_id_valid != Some(false)
    }
}

pub async fn verify_account(api: &dyn ProxyApi, account: &Account) -> AccountVerification {
    let mut verification = AccountVerification {
        account: account.name.clone(),
        configured_account_id: account.account_id.clone(),
        token: None,
        accessible_accounts: Vec::new(),
        account_id_valid: None,
        error: None,
    };

    let token = match api.token_info(&account.api_token).await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(account = %account.name, error = %e, "Token verification failed");
            verification.error = Some(e.to_string());
            return verification;
        }
    };
    verification.token = Some(token);

    match api.list_accounts(&account.api_token).await {
        Ok(accounts) => verification.accessible_accounts = accounts,
        Err(e) => {
            tracing::error!(account = %account.name, error = %e, "Failed to list accessible accounts");
            verification.error = Some(e.to_string());
            return verification;
        }
    }

    if let Some(configured) = &account.account_id {
        let valid = verification
            .accessible_accounts
            .iter()
            .any(|acc| &acc.id == configured);
        if !valid {
            tracing::warn!(
                account = %account.name,
                "Configured account ID {} not found in accessible accounts",
                configured
            );
        }
        verification.account_id_valid = Some(valid);
    }

    verification
}

/// Verify every account, `jobs` at a time, preserving order
pub async fn verify_accounts(
    api: &dyn ProxyApi,
    accounts: &[Account],
    jobs: usize,
) -> Vec<AccountVerification> {
    stream::iter(accounts)
        .map(|account| verify_account(api, account))
        .buffered(jobs.max(1))
        .collect()
        .await
}
