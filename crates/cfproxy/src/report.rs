//! Run reports: JSON, CSV and Markdown artifacts under the report directory

use cfproxy_cloud::{AccountVerification, RecordResult, RunResult, RunSummary, Verb};
use cfproxy_config::ScopeSummary;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to create report directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("No free report name for {stem} in {dir}")]
    NameExhausted { dir: PathBuf, stem: String },
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Context written alongside the results
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub filters: ScopeSummary,
    pub state_file: String,
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
    pub markdown: PathBuf,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    command: Verb,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration_ms: i64,
    dry_run: bool,
    interrupted: bool,
    filters: &'a ScopeSummary,
    state_file: &'a str,
    summary: RunSummary,
    results: &'a [RecordResult],
}

#[derive(Serialize)]
struct VerifyReport<'a> {
    command: Verb,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    accounts: &'a [AccountVerification],
}

const CSV_HEADER: &[&str] = &[
    "account",
    "account_id",
    "zone_name",
    "zone_id",
    "record_id",
    "record_name",
    "record_type",
    "content",
    "previous_proxied",
    "new_proxied",
    "action",
    "reason",
    "error",
    "dry_run",
];

/// Collision suffixes tried after the bare stem
const MAX_NAME_SUFFIX: u32 = 100;

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|source| ReportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Write a new file, never replacing an existing one
fn write_new(path: PathBuf, content: &str) -> std::io::Result<PathBuf> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
    file.write_all(content.as_bytes())?;
    tracing::debug!("Wrote report {}", path.display());
    Ok(path)
}

/// First stem (`base`, `base_2`, `base_3`, ...) for which none of the
/// `extensions` exist yet
fn free_stem(dir: &Path, base: &str, extensions: &[&str]) -> Result<String> {
    for n in 1..=MAX_NAME_SUFFIX {
        let stem = if n == 1 {
            base.to_string()
        } else {
            format!("{}_{}", base, n)
        };
        if extensions
            .iter()
            .all(|ext| !dir.join(format!("{}.{}", stem, ext)).exists())
        {
            return Ok(stem);
        }
    }
    Err(ReportError::NameExhausted {
        dir: dir.to_path_buf(),
        stem: base.to_string(),
    })
}

/// Write one artifact per `(extension, content)` under a shared free stem
/// and return that stem
///
/// Files are created with `create_new`. If another process claims one of the
/// names between the check and the write, the partial set is removed and
/// the next stem is tried.
fn write_set(dir: &Path, base: &str, artifacts: &[(&str, String)]) -> Result<String> {
    let extensions: Vec<&str> = artifacts.iter().map(|(ext, _)| *ext).collect();
    for _ in 0..MAX_NAME_SUFFIX {
        let stem = free_stem(dir, base, &extensions)?;
        let mut written = Vec::with_capacity(artifacts.len());
        let mut collided = false;
        for (ext, content) in artifacts {
            let path = dir.join(format!("{}.{}", stem, ext));
            match write_new(path.clone(), content) {
                Ok(path) => written.push(path),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    collided = true;
                    break;
                }
                Err(source) => return Err(ReportError::Write { path, source }),
            }
        }
        if !collided {
            return Ok(stem);
        }
        for path in written {
            let _ = std::fs::remove_file(path);
        }
        tracing::debug!("Report name {} was taken concurrently, retrying", stem);
    }
    Err(ReportError::NameExhausted {
        dir: dir.to_path_buf(),
        stem: base.to_string(),
    })
}

/// Write `<verb>_<ts>.{json,csv,md}` for a run
///
/// An existing report set with the same timestamp is never replaced; the
/// new set gets a `_2`, `_3`, ... suffix instead.
pub fn write_run_reports(dir: &Path, meta: &RunMetadata, run: &RunResult) -> Result<ReportPaths> {
    ensure_dir(dir)?;
    let base = format!("{}_{}", run.verb, timestamp(run.started_at));

    let report = JsonReport {
        command: run.verb,
        started_at: run.started_at,
        finished_at: run.finished_at,
        duration_ms: run.duration_ms(),
        dry_run: run.dry_run,
        interrupted: run.interrupted,
        filters: &meta.filters,
        state_file: &meta.state_file,
        summary: run.summary(),
        results: &run.results,
    };
    let artifacts = [
        ("json", serde_json::to_string_pretty(&report)?),
        ("csv", render_csv(&run.results)),
        ("md", render_markdown(meta, run)),
    ];

    let stem = write_set(dir, &base, &artifacts)?;
    Ok(ReportPaths {
        json: dir.join(format!("{}.json", stem)),
        csv: dir.join(format!("{}.csv", stem)),
        markdown: dir.join(format!("{}.md", stem)),
    })
}

/// Write `verify_<ts>.json`
pub fn write_verify_report(
    dir: &Path,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    accounts: &[AccountVerification],
) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let report = VerifyReport {
        command: Verb::Verify,
        started_at,
        finished_at,
        accounts,
    };
    let base = format!("verify_{}", timestamp(started_at));
    let artifacts = [("json", serde_json::to_string_pretty(&report)?)];
    let stem = write_set(dir, &base, &artifacts)?;
    Ok(dir.join(format!("{}.json", stem)))
}

fn is_reportable(result: &RecordResult) -> bool {
    matches!(
        result.outcome.kind(),
        cfproxy_cloud::ActionKind::Changed | cfproxy_cloud::ActionKind::Error
    )
}

fn opt_bool(value: Option<bool>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Flat change list: `changed` and `error` rows only
fn render_csv(results: &[RecordResult]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');

    for result in results.iter().filter(|r| is_reportable(r)) {
        let fields = [
            result.account.clone(),
            result.account_id.clone().unwrap_or_default(),
            result.zone_name.clone().unwrap_or_default(),
            result.zone_id.clone().unwrap_or_default(),
            result.record_id.clone().unwrap_or_default(),
            result.record_name.clone().unwrap_or_default(),
            result.record_type.clone().unwrap_or_default(),
            result.content.clone().unwrap_or_default(),
            opt_bool(result.previous_proxied),
            opt_bool(result.new_proxied),
            result.outcome.kind().to_string(),
            result.skip_reason().map(|r| r.to_string()).unwrap_or_default(),
            result.error_message().unwrap_or_default().to_string(),
            result.dry_run.to_string(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn md_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

fn render_markdown(meta: &RunMetadata, run: &RunResult) -> String {
    let summary = run.summary();
    let filters = &meta.filters;
    let list = |items: &[String]| {
        if items.is_empty() {
            "(all)".to_string()
        } else {
            items.join(", ")
        }
    };
    let pattern = |p: &Option<String>| {
        p.as_ref()
            .map(|p| format!("`{}`", p))
            .unwrap_or_else(|| "(none)".to_string())
    };

    let mut out = String::new();
    let _ = writeln!(out, "# cfproxy {} report", run.verb);
    out.push('\n');
    let _ = writeln!(out, "- Command: `{}`", run.verb);
    let _ = writeln!(out, "- Started: {}", run.started_at.to_rfc3339());
    let _ = writeln!(out, "- Finished: {}", run.finished_at.to_rfc3339());
    let _ = writeln!(out, "- Duration: {} ms", run.duration_ms());
    let _ = writeln!(out, "- Dry run: {}", if run.dry_run { "yes" } else { "no" });
    if run.interrupted {
        out.push_str("- Interrupted: yes, remaining zones were not processed\n");
    }
    let _ = writeln!(out, "- State file: `{}`", meta.state_file);
    let _ = writeln!(out, "- Accounts: {}", list(&filters.accounts));
    let _ = writeln!(out, "- Zones: {}", list(&filters.zones));
    let _ = writeln!(out, "- Include: {}", pattern(&filters.include));
    let _ = writeln!(out, "- Exclude: {}", pattern(&filters.exclude));

    out.push_str("\n## Summary\n\n| Action | Count |\n|---|---|\n");
    let _ = writeln!(out, "| changed | {} |", summary.changed);
    let _ = writeln!(out, "| skipped | {} |", summary.skipped);
    for (reason, count) in &summary.skipped_by_reason {
        let _ = writeln!(out, "| skipped: {} | {} |", reason, count);
    }
    let _ = writeln!(out, "| error | {} |", summary.error);
    if summary.observed > 0 {
        let _ = writeln!(out, "| observed | {} |", summary.observed);
    }

    out.push_str("\n## Changes and errors\n\n");
    let rows: Vec<&RecordResult> = run.results.iter().filter(|r| is_reportable(r)).collect();
    if rows.is_empty() {
        out.push_str("No records were changed.\n");
        return out;
    }

    out.push_str("| Account | Zone | Record | Type | Before | After | Action | Detail |\n");
    out.push_str("|---|---|---|---|---|---|---|---|\n");
    for r in rows {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            md_cell(&r.account),
            md_cell(r.zone_name.as_deref().unwrap_or("-")),
            md_cell(r.record_name.as_deref().unwrap_or("-")),
            md_cell(r.record_type.as_deref().unwrap_or("-")),
            opt_bool(r.previous_proxied),
            opt_bool(r.new_proxied),
            r.outcome.kind(),
            md_cell(r.error_message().unwrap_or("")),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfproxy_cloud::{DnsRecord, Outcome, SkipReason, Zone};
    use cfproxy_config::Account;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record(id: &str, name: &str, proxied: bool) -> DnsRecord {
        DnsRecord {
            id: id.into(),
            zone_id: "z1".into(),
            name: name.into(),
            record_type: "A".into(),
            content: "192.0.2.1".into(),
            proxied: Some(proxied),
            proxiable: Some(true),
        }
    }

    fn run() -> RunResult {
        let account = Account::new("prod", "t", Some("acc-1".into()));
        let zone = Zone::new("z1", "example.com");
        let started_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        RunResult {
            verb: Verb::Disable,
            dry_run: false,
            started_at,
            finished_at: started_at + chrono::Duration::seconds(4),
            interrupted: false,
            results: vec![
                RecordResult::for_record(&account, &zone, &record("r1", "api.example.com", true), Outcome::Changed)
                    .with_new_proxied(false),
                RecordResult::for_record(
                    &account,
                    &zone,
                    &record("r2", "www.example.com", false),
                    Outcome::skipped(SkipReason::AlreadyDisabled),
                ),
                RecordResult::for_record(
                    &account,
                    &zone,
                    &record("r3", "odd,name.example.com", true),
                    Outcome::error("HTTP 500: \"boom\""),
                ),
                RecordResult::zone_error(&account, &Zone::new("z2", "example.org"), "timeout"),
            ],
        }
    }

    fn meta() -> RunMetadata {
        RunMetadata {
            filters: ScopeSummary {
                accounts: vec!["prod".into()],
                zones: vec![],
                include: Some(r"^api\.".into()),
                exclude: None,
            },
            state_file: "proxy_state.json".into(),
        }
    }

    #[test]
    fn test_writes_three_artifacts() {
        let dir = tempdir().unwrap();
        let report_dir = dir.path().join("reports");

        let paths = write_run_reports(&report_dir, &meta(), &run()).unwrap();

        assert_eq!(
            paths.json.file_name().unwrap(),
            "disable_20240501T123000Z.json"
        );
        assert!(paths.csv.exists());
        assert!(paths.markdown.exists());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(json["command"], "disable");
        assert_eq!(json["summary"]["changed"], 1);
        assert_eq!(json["summary"]["error"], 2);
        assert_eq!(json["results"].as_array().unwrap().len(), 4);
        assert_eq!(json["filters"]["include"], r"^api\.");
        assert_eq!(json["duration_ms"], 4000);
        assert_eq!(json["interrupted"], false);
    }

    #[test]
    fn test_same_second_runs_keep_both_report_sets() {
        let dir = tempdir().unwrap();

        let mut dry_run = run();
        dry_run.dry_run = true;
        let first = write_run_reports(dir.path(), &meta(), &dry_run).unwrap();

        let mut real = run();
        real.started_at += chrono::Duration::milliseconds(400);
        let second = write_run_reports(dir.path(), &meta(), &real).unwrap();

        assert_eq!(first.json.file_name().unwrap(), "disable_20240501T123000Z.json");
        assert_eq!(second.json.file_name().unwrap(), "disable_20240501T123000Z_2.json");
        assert_eq!(second.markdown.file_name().unwrap(), "disable_20240501T123000Z_2.md");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 6);

        let kept: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&first.json).unwrap()).unwrap();
        assert_eq!(kept["dry_run"], true);
        let latest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&second.json).unwrap()).unwrap();
        assert_eq!(latest["dry_run"], false);
    }

    #[test]
    fn test_markdown_marks_interrupted_runs() {
        let mut run = run();
        run.interrupted = true;
        let md = render_markdown(&meta(), &run);
        assert!(md.contains("- Interrupted: yes"));
        assert!(md.contains("- Duration: 4000 ms"));
    }

    #[test]
    fn test_csv_has_only_changed_and_error_rows() {
        let csv = render_csv(&run().results);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("account,account_id,zone_name"));
        assert!(lines[1].contains("api.example.com"));
        assert!(lines[1].contains(",changed,"));
        assert!(!csv.contains("www.example.com"));
        assert!(lines[2].contains("\"odd,name.example.com\""));
        assert!(lines[2].contains("\"HTTP 500: \"\"boom\"\"\""));
        assert!(lines[3].contains("example.org"));
    }

    #[test]
    fn test_markdown_summary() {
        let md = render_markdown(&meta(), &run());
        assert!(md.starts_with("# cfproxy disable report"));
        assert!(md.contains("| changed | 1 |"));
        assert!(md.contains("| skipped: already_disabled | 1 |"));
        assert!(md.contains("| error | 2 |"));
        assert!(md.contains("- Include: `^api\\.`"));
        assert!(md.contains("| prod | example.com | api.example.com | A | true | false | changed |  |"));
    }

    #[test]
    fn test_markdown_without_changes() {
        let mut run = run();
        run.results.retain(|r| !is_reportable(r));
        let md = render_markdown(&meta(), &run);
        assert!(md.contains("No records were changed."));
    }

    #[test]
    fn test_verify_report() {
        let dir = tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let path = write_verify_report(dir.path(), at, at, &[]).unwrap();
        assert_eq!(path.file_name().unwrap(), "verify_20240501T080000Z.json");
    }

    #[test]
    fn test_unwritable_dir_is_an_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let err = write_run_reports(&blocker.join("reports"), &meta(), &run()).unwrap_err();
        assert!(matches!(err, ReportError::CreateDir { .. }));
    }
}
