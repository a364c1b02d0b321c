//! Command dispatch across accounts

use crate::action::{RecordResult, RunResult, Verb};
use crate::engine::Engine;
use crate::enumerate::Enumerator;
use crate::error::{CloudError, Result};
use crate::provider::ProxyApi;
use crate::state::StateHandle;
use cfproxy_config::{Account, Scope};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub verb: Verb,
    pub dry_run: bool,

    /// Accounts processed concurrently
    pub jobs: usize,
}

impl RunOptions {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            dry_run: false,
            jobs: 1,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }
}

/// Shared stop flag, set from a Ctrl-C handler
///
/// The runner checks it before each zone. A zone already in progress runs
/// to completion so its captures and PATCHes end up in the results.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-zone work for the verbs that walk DNS records
#[derive(Debug, Clone, Copy)]
enum ZonePass {
    Disable,
    Restore,
    Status,
}

impl ZonePass {
    fn for_verb(verb: Verb) -> Option<Self> {
        match verb {
            Verb::Disable => Some(Self::Disable),
            Verb::Restore => Some(Self::Restore),
            Verb::Status => Some(Self::Status),
            Verb::Verify => None,
        }
    }
}

/// Runs a verb over every account: enumerate, decide, apply
pub struct Runner {
    api: Arc<dyn ProxyApi>,
    state: Arc<StateHandle>,
    scope: Scope,
    interrupt: Interrupt,
}

impl Runner {
    pub fn new(api: Arc<dyn ProxyApi>, state: Arc<StateHandle>, scope: Scope) -> Self {
        Self {
            api,
            state,
            scope,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Results keep account order regardless of `jobs`; within an account
    /// zones and records are processed sequentially in API order.
    ///
    /// `verify` has no per-record work and is rejected.
    pub async fn run(&self, accounts: &[Account], options: RunOptions) -> Result<RunResult> {
        let pass = ZonePass::for_verb(options.verb)
            .ok_or(CloudError::UnsupportedVerb(options.verb))?;

        let started_at = Utc::now();
        tracing::info!(
            verb = %options.verb,
            provider = self.api.name(),
            dry_run = options.dry_run,
            accounts = accounts.len(),
            "Starting run"
        );

        let per_account: Vec<Vec<RecordResult>> = stream::iter(accounts)
            .map(|account| self.run_account(account, pass, options.dry_run))
            .buffered(options.jobs.max(1))
            .collect()
            .await;

        let interrupted = self.interrupt.is_triggered();
        let result = RunResult {
            verb: options.verb,
            dry_run: options.dry_run,
            started_at,
            finished_at: Utc::now(),
            interrupted,
            results: per_account.into_iter().flatten().collect(),
        };
        if interrupted {
            tracing::warn!(verb = %options.verb, "Run interrupted: {}", result.summary());
        } else {
            tracing::info!(verb = %options.verb, "Run finished: {}", result.summary());
        }
        Ok(result)
    }

    async fn run_account(&self, account: &Account, pass: ZonePass, dry_run: bool) -> Vec<RecordResult> {
        if self.interrupt.is_triggered() {
            return Vec::new();
        }

        let enumerator = Enumerator::new(self.api.as_ref(), &self.scope);
        let engine = Engine::new(self.api.as_ref(), &self.state, dry_run);

        let zones = match enumerator.list_zones(account).await {
            Ok(zones) => zones,
            Err(e) => {
                tracing::error!(account = %account.name, error = %e, "Failed to list zones");
                return vec![RecordResult::account_error(account, e).with_dry_run(dry_run)];
            }
        };

        let mut results = Vec::new();
        for zone in &zones {
            if self.interrupt.is_triggered() {
                tracing::warn!(account = %account.name, zone = %zone.name, "Interrupted, skipping remaining zones");
                break;
            }

            let records = match enumerator.list_records(account, zone).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::error!(
                        account = %account.name,
                        zone = %zone.name,
                        error = %e,
                        "Failed to list DNS records"
                    );
                    results.push(RecordResult::zone_error(account, zone, e).with_dry_run(dry_run));
                    continue;
                }
            };

            let zone_results = match pass {
                ZonePass::Disable => engine.disable_zone(account, zone, &records).await,
                ZonePass::Restore => engine.restore_zone(account, zone, &records).await,
                ZonePass::Status => engine.status_zone(account, zone, &records).await,
            };
            results.extend(zone_results);
        }
        results
    }
}
