use cfproxy_cloud::{AccountVerification, Outcome, ProxyState, RecordResult, RunResult, StateEntry};
use colored::Colorize;
use std::collections::BTreeMap;

fn proxied_label(value: Option<bool>) -> String {
    match value {
        Some(true) => "proxied".to_string(),
        Some(false) => "dns-only".to_string(),
        None => "n/a".to_string(),
    }
}

fn record_label(result: &RecordResult) -> String {
    match (&result.record_name, &result.zone_name) {
        (Some(record), _) => format!(
            "{} ({})",
            record,
            result.record_type.as_deref().unwrap_or("?")
        ),
        (None, Some(zone)) => format!("zone {}", zone),
        (None, None) => format!("account {}", result.account),
    }
}

/// Changed and errored rows of a mutating run, then the summary
pub fn print_run(run: &RunResult) {
    let prefix = if run.dry_run { "[dry-run] " } else { "" };
    println!();
    for result in &run.results {
        match &result.outcome {
            Outcome::Changed => println!(
                "  {} {}{}: {} → {}",
                "✓".green(),
                prefix.dimmed(),
                record_label(result),
                proxied_label(result.previous_proxied),
                proxied_label(result.new_proxied).cyan()
            ),
            Outcome::Error { error } => println!(
                "  {} {} [{}]: {}",
                "✗".red(),
                record_label(result),
                result.account,
                error.red()
            ),
            Outcome::Skipped { .. } | Outcome::Observed => {}
        }
    }
    print_summary(run);
}

/// Every row of a `status` run, grouped by account and zone
pub fn print_status(run: &RunResult) {
    let mut current: Option<(&str, Option<&str>)> = None;
    for result in &run.results {
        let key = (result.account.as_str(), result.zone_name.as_deref());
        if current.map(|(account, _)| account) != Some(key.0) {
            println!("\n{} {}", "Account:".bold(), key.0);
        }
        if current != Some(key) {
            if let Some(zone) = key.1 {
                println!("  {} {}", "Zone:".bold(), zone);
            }
        }
        current = Some(key);

        match &result.outcome {
            Outcome::Error { error } => println!("    {} {}", "✗".red(), error.red()),
            _ => {
                let prior = match result.prior_value {
                    Some(value) => format!("captured original: {}", proxied_label(Some(value))),
                    None => "no captured state".to_string(),
                };
                let current_label = match result.skip_reason() {
                    Some(reason) => format!("{} ({})", proxied_label(result.previous_proxied), reason),
                    None => proxied_label(result.previous_proxied),
                };
                let current_label = if result.previous_proxied == Some(true) {
                    current_label.green()
                } else {
                    current_label.yellow()
                };
                println!(
                    "    {}: {} {}",
                    record_label(result),
                    current_label,
                    format!("[{}]", prior).dimmed()
                );
            }
        }
    }
    print_summary(run);
}

pub fn print_summary(run: &RunResult) {
    let summary = run.summary();
    println!();
    println!("{}", "Summary".bold());
    println!("  changed:  {}", summary.changed.to_string().green());
    println!("  skipped:  {}", summary.skipped);
    for (reason, count) in &summary.skipped_by_reason {
        println!("    {}: {}", reason, count);
    }
    if summary.observed > 0 {
        println!("  observed: {}", summary.observed);
    }
    let errors = summary.error.to_string();
    if summary.error > 0 {
        println!("  errors:   {}", errors.red().bold());
    } else {
        println!("  errors:   {}", errors);
    }
}

pub fn print_verification(verification: &AccountVerification) {
    println!("{} {}", "Account:".bold(), verification.account);

    if let Some(error) = &verification.error {
        println!("  {} Error: {}", "✗".red(), error);
        println!();
        return;
    }

    if let Some(token) = &verification.token {
        println!(
            "  {} Token status: {}",
            "✓".green(),
            token.status.as_deref().unwrap_or("unknown")
        );
        println!(
            "  {} Token ID: {}",
            "✓".green(),
            token.token_id.as_deref().unwrap_or("unknown")
        );
        if let Some(email) = &token.email {
            println!("  {} Token email: {}", "✓".green(), email);
        }
    }

    match (&verification.configured_account_id, verification.account_id_valid) {
        (Some(id), Some(true)) => {
            println!("  {} Configured account ID: {} (valid)", "✓".green(), id)
        }
        (Some(id), _) => println!(
            "  {} Configured account ID: {} (not found in accessible accounts)",
            "✗".red(),
            id
        ),
        (None, _) => println!(
            "  {} No account ID configured; every zone the token can see will be processed",
            "!".yellow()
        ),
    }

    println!("\n  {}", "Accessible Cloudflare accounts:".bold());
    for account in &verification.accessible_accounts {
        println!(
            "    • {} (ID: {}, Type: {})",
            account.name,
            account.id,
            account.account_type.as_deref().unwrap_or("unknown")
        );
    }
    println!();
}

/// Contents of the state file, grouped by account and zone
pub fn print_state<'a>(state: &ProxyState, entries: impl Iterator<Item = &'a StateEntry>) {
    println!("{} {}", "Last updated:".bold(), state.updated_at.to_rfc3339());

    let mut grouped: BTreeMap<&str, BTreeMap<(&str, &str), Vec<&StateEntry>>> = BTreeMap::new();
    for entry in entries {
        grouped
            .entry(entry.account.as_str())
            .or_default()
            .entry((entry.zone_name.as_str(), entry.zone_id.as_str()))
            .or_default()
            .push(entry);
    }

    let mut total = 0;
    for (account, zones) in &grouped {
        println!("\n{} {}", "Account:".bold(), account);
        for ((zone_name, zone_id), entries) in zones {
            println!("  {} {} ({})", "Zone:".bold(), zone_name, zone_id);
            for entry in entries {
                total += 1;
                println!(
                    "    {} ({}): original {} {}",
                    entry.record_name,
                    entry.record_type,
                    proxied_label(Some(entry.original_proxied)).green(),
                    format!("[captured {}]", entry.captured_at.to_rfc3339()).dimmed()
                );
            }
        }
    }

    println!("\n{} {}", "Captured records:".bold(), total);
}
