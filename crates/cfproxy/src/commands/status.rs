use super::Context;
use crate::{GlobalArgs, utils};
use cfproxy_cloud::{StateStore, Verb};
use colored::Colorize;
use std::process::ExitCode;

/// Live status: current values next to captured originals
pub async fn handle(ctx: &Context) -> anyhow::Result<ExitCode> {
    println!(
        "{}",
        format!("Checking proxy status for {} account(s)...", ctx.accounts.len()).blue()
    );

    let run = super::run_verb(ctx, Verb::Status, false).await?;
    utils::print_status(&run);
    Ok(super::finish(ctx, &run))
}

/// Print the state file without touching the API
pub async fn offline(args: &GlobalArgs) -> anyhow::Result<ExitCode> {
    let store = StateStore::new(&args.state_file);
    if !store.path().exists() {
        println!(
            "{}",
            format!(
                "No state file found at {}. Run 'cfproxy disable' first to create one.",
                store.path().display()
            )
            .yellow()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let scope = super::build_scope(args)?;
    let only: Vec<String> = args.accounts.iter().map(|a| a.trim().to_lowercase()).collect();
    let state = store.load().await?;

    let entries = state.iter().map(|(_, entry)| entry).filter(|entry| {
        (only.is_empty() || only.contains(&entry.account))
            && scope.zones.matches(&entry.zone_id, &entry.zone_name)
            && scope.records.matches(&entry.record_name)
    });
    utils::print_state(&state, entries);
    Ok(ExitCode::SUCCESS)
}
