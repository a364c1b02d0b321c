//! Account resolution
//!
//! Turns `CLOUDFLARE_API_TOKEN_<NAME>` / `CLOUDFLARE_ACCOUNT_ID_<NAME>`
//! environment pairs into an ordered list of [`Account`]s. Nothing outside
//! this module reads credentials from the environment.

use crate::error::{ConfigError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub const TOKEN_PREFIX: &str = "CLOUDFLARE_API_TOKEN_";
pub const ACCOUNT_ID_PREFIX: &str = "CLOUDFLARE_ACCOUNT_ID_";

/// A logical Cloudflare account: one API token, optionally scoped to an account ID
#[derive(Clone, Serialize)]
pub struct Account {
    /// Lowercased `<NAME>` suffix of the token variable
    pub name: String,

    #[serde(skip)]
    pub api_token: String,

    /// Server-side zone filter. `None` means every zone the token can see
    pub account_id: Option<String>,
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        api_token: impl Into<String>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_token: api_token.into(),
            account_id,
        }
    }

    /// Name of the environment variable that would carry this account's ID
    pub fn account_id_var(&self) -> String {
        format!("{}{}", ACCOUNT_ID_PREFIX, self.name.to_uppercase())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("api_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Options applied while resolving accounts
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Fail instead of warn when an account has no account ID
    pub require_account_id: bool,

    /// `--account` allow-list; empty means all accounts
    pub only: Vec<String>,
}

/// Resolve accounts from the process environment
pub fn resolve_from_env(options: &ResolveOptions) -> Result<Vec<Account>> {
    let vars = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
    resolve_accounts(vars, options)
}

/// Resolve accounts from an arbitrary set of `(key, value)` pairs
///
/// Accounts are returned sorted by name. The `--account` allow-list is applied
/// before the account ID requirement, so unrelated accounts never fail a run.
pub fn resolve_accounts<I, K, V>(vars: I, options: &ResolveOptions) -> Result<Vec<Account>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut tokens: BTreeMap<String, (String, String)> = BTreeMap::new();
    let mut account_ids: BTreeMap<String, (String, String)> = BTreeMap::new();

    for (key, value) in vars {
        let (key, value) = (key.as_ref(), value.as_ref());
        if let Some(suffix) = key.strip_prefix(TOKEN_PREFIX) {
            if suffix.is_empty() {
                continue;
            }
            insert_unique(&mut tokens, suffix.to_lowercase(), key, value.to_string())?;
        } else if let Some(suffix) = key.strip_prefix(ACCOUNT_ID_PREFIX) {
            if suffix.is_empty() || value.trim().is_empty() {
                continue;
            }
            insert_unique(&mut account_ids, suffix.to_uppercase(), key, value.trim().to_string())?;
        }
    }

    if tokens.is_empty() {
        return Err(ConfigError::NoAccounts);
    }

    let mut accounts = Vec::with_capacity(tokens.len());
    for (name, (var, token)) in tokens {
        if token.trim().is_empty() {
            return Err(ConfigError::EmptyToken { var });
        }
        let account_id = account_ids
            .get(&name.to_uppercase())
            .map(|(_, id)| id.clone());
        accounts.push(Account::new(name, token.trim(), account_id));
    }

    let accounts = filter_accounts(accounts, &options.only)?;

    for account in &accounts {
        match &account.account_id {
            Some(id) => {
                tracing::info!(account = %account.name, account_id = %id, "Loaded account");
            }
            None if options.require_account_id => {
                return Err(ConfigError::MissingAccountId {
                    account: account.name.clone(),
                    var: account.account_id_var(),
                });
            }
            None => {
                tracing::warn!(
                    account = %account.name,
                    "Account has no account ID; zones from every account visible to the token will be processed (set {})",
                    account.account_id_var()
                );
            }
        }
    }

    Ok(accounts)
}

/// Variables whose names differ only in case would silently shadow each other
fn insert_unique(
    map: &mut BTreeMap<String, (String, String)>,
    name: String,
    var: &str,
    value: String,
) -> Result<()> {
    if let Some((existing, _)) = map.get(&name) {
        let (first, second) = if existing.as_str() <= var {
            (existing.clone(), var.to_string())
        } else {
            (var.to_string(), existing.clone())
        };
        return Err(ConfigError::DuplicateAccount {
            name: name.to_lowercase(),
            first,
            second,
        });
    }
    map.insert(name, (var.to_string(), value));
    Ok(())
}

fn filter_accounts(accounts: Vec<Account>, only: &[String]) -> Result<Vec<Account>> {
    if only.is_empty() {
        return Ok(accounts);
    }

    let wanted: Vec<String> = only
        .iter()
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect();

    if let Some(unknown) = wanted
        .iter()
        .find(|n| !accounts.iter().any(|a| &a.name == *n))
    {
        return Err(ConfigError::UnknownAccount {
            name: unknown.clone(),
            available: accounts
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    Ok(accounts
        .into_iter()
        .filter(|a| wanted.contains(&a.name))
        .collect())
}
