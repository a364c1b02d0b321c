use super::Context;
use crate::utils;
use cfproxy_cloud::Verb;
use colored::Colorize;
use std::process::ExitCode;

pub async fn handle(ctx: &Context, dry_run: bool) -> anyhow::Result<ExitCode> {
    if dry_run {
        println!(
            "{}",
            "Dry run: no records or state will be modified".yellow().bold()
        );
    }
    println!(
        "{}",
        format!(
            "Disabling proxy for {} account(s)...",
            ctx.accounts.len()
        )
        .blue()
    );
    println!("State file: {}", ctx.store.path().display().to_string().cyan());

    let run = super::run_verb(ctx, Verb::Disable, dry_run).await?;
    utils::print_run(&run);
    Ok(super::finish(ctx, &run))
}
