//! Reversible proxied-flag management for Cloudflare DNS records
//!
//! This crate holds the provider-independent core: the [`ProxyApi`]
//! collaborator trait, the state file that remembers original values, the
//! mutation engine and the multi-account runner.

pub mod action;
pub mod engine;
pub mod enumerate;
pub mod error;
pub mod provider;
pub mod runner;
pub mod state;
pub mod verify;

#[cfg(test)]
mod testing;

pub use action::{ActionKind, Outcome, RecordResult, RunResult, RunSummary, SkipReason, Verb};
pub use engine::{Decision, Engine, decide_disable, decide_restore, observe};
pub use enumerate::Enumerator;
pub use error::{CloudError, Result};
pub use provider::{AccessibleAccount, DnsRecord, ProxyApi, RetryConfig, TokenInfo, Zone};
pub use runner::{Interrupt, RunOptions, Runner};
pub use state::{
    DEFAULT_STATE_FILE, ProxyState, StateEntry, StateHandle, StateKey, StateLock, StateStore,
};
pub use verify::{AccountVerification, verify_account, verify_accounts};
