use super::{Context, EXIT_ERRORS, EXIT_INTERRUPTED};
use crate::{report, utils};
use cfproxy_cloud::verify_accounts;
use chrono::Utc;
use colored::Colorize;
use std::process::ExitCode;

pub async fn handle(ctx: &Context) -> anyhow::Result<ExitCode> {
    println!("{}\n", "Verifying account configurations...".blue().bold());

    let started_at = Utc::now();
    let verifications = verify_accounts(ctx.api.as_ref(), &ctx.accounts, ctx.jobs).await;
    for verification in &verifications {
        utils::print_verification(verification);
    }

    match report::write_verify_report(&ctx.report_dir, started_at, Utc::now(), &verifications) {
        Ok(path) => println!("{} {}", "Report:".bold(), path.display().to_string().cyan()),
        Err(e) => tracing::error!("Failed to write verify report: {}", e),
    }

    if ctx.interrupt.is_triggered() {
        Ok(ExitCode::from(EXIT_INTERRUPTED))
    } else if verifications.iter().all(|v| v.is_ok()) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_ERRORS))
    }
}
