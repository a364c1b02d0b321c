use super::Context;
use crate::utils;
use cfproxy_cloud::Verb;
use colored::Colorize;
use std::process::ExitCode;

pub async fn handle(ctx: &Context, dry_run: bool) -> anyhow::Result<ExitCode> {
    if !ctx.store.path().exists() {
        println!(
            "{}",
            format!(
                "No state file at {}. Nothing was captured, so every record will be skipped.",
                ctx.store.path().display()
            )
            .yellow()
        );
    }
    if dry_run {
        println!("{}", "Dry run: no records will be modified".yellow().bold());
    }
    println!(
        "{}",
        format!(
            "Restoring proxy settings for {} account(s)...",
            ctx.accounts.len()
        )
        .blue()
    );

    let run = super::run_verb(ctx, Verb::Restore, dry_run).await?;
    utils::print_run(&run);
    Ok(super::finish(ctx, &run))
}
