pub mod disable;
pub mod restore;
pub mod status;
pub mod verify;

use crate::GlobalArgs;
use crate::report::{self, RunMetadata};
use anyhow::Context as _;
use cfproxy_cloud::{
    Interrupt, ProxyApi, RetryConfig, RunOptions, RunResult, Runner, StateHandle, StateStore, Verb,
};
use cfproxy_cloud_cloudflare::{ClientConfig, CloudflareClient};
use cfproxy_config::{Account, RecordFilter, ResolveOptions, Scope, ZoneFilter, resolve_from_env};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// At least one `error` row
pub const EXIT_ERRORS: u8 = 1;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Everything a command needs, resolved once from flags and environment
pub struct Context {
    pub accounts: Vec<Account>,
    pub scope: Scope,
    pub api: Arc<dyn ProxyApi>,
    pub store: StateStore,
    pub report_dir: PathBuf,
    pub jobs: usize,
    pub interrupt: Interrupt,
}

impl Context {
    pub fn from_args(args: &GlobalArgs, interrupt: Interrupt) -> anyhow::Result<Self> {
        let scope = build_scope(args)?;
        let accounts = resolve_from_env(&ResolveOptions {
            require_account_id: args.require_account_id,
            only: args.accounts.clone(),
        })?;

        let client = CloudflareClient::new(
            ClientConfig::default()
                .with_api_base(args.api_base.clone())
                .with_timeout(Duration::from_secs(args.timeout))
                .with_retry(RetryConfig::default().with_max_attempts(args.max_retries)),
        )?;

        Ok(Self {
            accounts,
            scope,
            api: Arc::new(client),
            store: StateStore::new(&args.state_file),
            report_dir: args.report_dir.clone(),
            jobs: args.jobs,
            interrupt,
        })
    }

    fn account_names(&self) -> Vec<String> {
        self.accounts.iter().map(|a| a.name.clone()).collect()
    }
}

pub fn build_scope(args: &GlobalArgs) -> anyhow::Result<Scope> {
    let records = RecordFilter::new(args.include.as_deref(), args.exclude.as_deref())?;
    Ok(Scope::new(ZoneFilter::new(args.zones.iter().cloned()), records))
}

/// Run a verb over all accounts
///
/// Real mutating runs hold the state lock for their whole duration; dry runs
/// and `status` never take it.
pub async fn run_verb(ctx: &Context, verb: Verb, dry_run: bool) -> anyhow::Result<RunResult> {
    let lock = if verb.is_mutating() && !dry_run {
        Some(
            ctx.store
                .acquire_lock()
                .await
                .context("Another cfproxy run may be in progress")?,
        )
    } else {
        None
    };

    let state = StateHandle::open(ctx.store.clone())
        .await
        .with_context(|| format!("Failed to load state file {}", ctx.store.path().display()))?;
    let runner = Runner::new(ctx.api.clone(), Arc::new(state), ctx.scope.clone())
        .with_interrupt(ctx.interrupt.clone());
    let result = runner
        .run(
            &ctx.accounts,
            RunOptions::new(verb).dry_run(dry_run).jobs(ctx.jobs),
        )
        .await;

    if let Some(lock) = lock {
        if let Err(e) = lock.release().await {
            tracing::warn!("Failed to release state lock: {}", e);
        }
    }
    Ok(result?)
}

/// Write reports and map the run to an exit code
///
/// Report failures are logged and never change the exit code. Interrupted
/// runs still get their partial reports.
pub fn finish(ctx: &Context, run: &RunResult) -> ExitCode {
    let meta = RunMetadata {
        filters: ctx.scope.summary(&ctx.account_names()),
        state_file: ctx.store.path().display().to_string(),
    };

    match report::write_run_reports(&ctx.report_dir, &meta, run) {
        Ok(paths) => {
            println!("\n{}", "Reports:".bold());
            for path in [&paths.json, &paths.csv, &paths.markdown] {
                println!("  • {}", path.display().to_string().cyan());
            }
        }
        Err(e) => tracing::error!("Failed to write reports: {}", e),
    }

    if run.interrupted {
        println!(
            "{}",
            "Run was interrupted; the reports cover only the zones that finished".yellow()
        );
        ExitCode::from(EXIT_INTERRUPTED)
    } else if run.has_errors() {
        ExitCode::from(EXIT_ERRORS)
    } else {
        ExitCode::SUCCESS
    }
}
