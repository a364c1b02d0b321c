mod commands;
mod logging;
mod report;
mod utils;

use cfproxy_cloud::{DEFAULT_STATE_FILE, Interrupt};
use cfproxy_cloud_cloudflare::DEFAULT_API_BASE;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use commands::{Context, EXIT_INTERRUPTED};
use std::path::PathBuf;
use std::process::ExitCode;

/// Configuration or state error before any record was processed
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "cfproxy", version)]
#[command(
    about = "Temporarily turn off Cloudflare proxying across accounts and restore it later",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory for JSON/CSV/Markdown reports
    #[arg(long, global = true, default_value = "reports")]
    pub report_dir: PathBuf,

    /// State file holding captured original values
    #[arg(long, global = true, env = "CFPROXY_STATE_FILE", default_value = DEFAULT_STATE_FILE)]
    pub state_file: PathBuf,

    /// Fail if any selected account has no CLOUDFLARE_ACCOUNT_ID_<NAME>
    #[arg(long, global = true)]
    pub require_account_id: bool,

    /// Only process these accounts (comma separated)
    #[arg(long = "account", global = true, value_delimiter = ',')]
    pub accounts: Vec<String>,

    /// Only process these zones, by name or ID (comma separated)
    #[arg(long = "zone", global = true, value_delimiter = ',')]
    pub zones: Vec<String>,

    /// Only process records whose name matches this regex
    #[arg(long, global = true)]
    pub include: Option<String>,

    /// Skip records whose name matches this regex (wins over --include)
    #[arg(long, global = true)]
    pub exclude: Option<String>,

    /// Accounts processed concurrently
    #[arg(long, global = true, default_value_t = 1)]
    pub jobs: usize,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout: u64,

    /// Retries for transient API failures
    #[arg(long, global = true, default_value_t = 3)]
    pub max_retries: u32,

    /// Cloudflare API base URL
    #[arg(long, global = true, env = "CLOUDFLARE_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Also write JSON-lines logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn off proxying for every proxied record, capturing originals first
    Disable {
        /// Show what would change without modifying records or state
        #[arg(long)]
        dry_run: bool,
    },
    /// Restore captured proxy settings
    Restore {
        /// Show what would change without modifying records
        #[arg(long)]
        dry_run: bool,
    },
    /// Show current proxy settings next to captured originals
    Status {
        /// Print the state file only, without calling the API
        #[arg(long)]
        offline: bool,
    },
    /// Check API tokens and configured account IDs
    Verify,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.global.verbose, cli.global.log_file.as_deref()) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        return ExitCode::from(EXIT_FATAL);
    }

    let interrupt = Interrupt::new();
    watch_ctrl_c(interrupt.clone());

    match run(cli, interrupt).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// First Ctrl-C stops dispatch after the current zone so reports still get
/// written and the lock is released; a second one exits immediately.
fn watch_ctrl_c(interrupt: Interrupt) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        interrupt.trigger();
        eprintln!(
            "\n{}",
            "Interrupted: finishing the current zone, then writing reports (Ctrl-C again to abort)"
                .yellow()
        );

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Aborted".red().bold());
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
    });
}

async fn run(cli: Cli, interrupt: Interrupt) -> anyhow::Result<ExitCode> {
    // Offline status needs neither credentials nor the API
    if let Commands::Status { offline: true } = cli.command {
        return commands::status::offline(&cli.global).await;
    }

    let ctx = Context::from_args(&cli.global, interrupt)?;
    match cli.command {
        Commands::Disable { dry_run } => commands::disable::handle(&ctx, dry_run).await,
        Commands::Restore { dry_run } => commands::restore::handle(&ctx, dry_run).await,
        Commands::Status { .. } => commands::status::handle(&ctx).await,
        Commands::Verify => commands::verify::handle(&ctx).await,
    }
}
