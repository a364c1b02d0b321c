//! Configuration for cfproxy
//!
//! Resolves per-account credentials from the environment and compiles the
//! zone/record scoping filters. Every error here is fatal and is raised
//! before any API call is made.

pub mod account;
pub mod error;
pub mod filter;

pub use account::{
    ACCOUNT_ID_PREFIX, Account, ResolveOptions, TOKEN_PREFIX, resolve_accounts, resolve_from_env,
};
pub use error::{ConfigError, Result};
pub use filter::{RecordFilter, Scope, ScopeSummary, ZoneFilter};
