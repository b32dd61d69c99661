//! nightly-backup - Main entry point

use chrono::{Local, NaiveDate};
use clap::error::ErrorKind;
use clap::Parser;
use nightly_backup::config::{Config, DEFAULT_CONFIG_ROOT};
use nightly_backup::items::ItemRegistry;
use nightly_backup::utils::format::format_size;
use nightly_backup::{utils, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;

const EXIT_FAILURE: u8 = 1;
const EXIT_HELP: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding config.toml, items.d/ and .env
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_CONFIG_ROOT)]
    config_root: PathBuf,

    /// Local backup root (overrides config)
    #[arg(short, long, value_name = "DIR")]
    backup_root: Option<PathBuf>,

    /// Replace today's backup if it already exists
    #[arg(short, long)]
    force: bool,

    /// Neither mirror to nor prune the remote store
    #[arg(long)]
    skip_remote: bool,

    /// Do not apply retention
    #[arg(long)]
    skip_cleanup: bool,

    /// Run as if today were this date
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: Option<NaiveDate>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// Exit code for a command line that did not parse into a run
fn usage_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => EXIT_HELP,
        ErrorKind::DisplayVersion => 0,
        _ => EXIT_FAILURE,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_exit_code(e.kind()));
        }
    };

    // Logging is not up yet, so configuration errors go to stderr directly
    let mut config = match Config::load(&args.config_root) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("nightly-backup: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };
    if let Some(root) = args.backup_root {
        config.backup_root = root;
    }
    config.flags.force = args.force;
    config.flags.skip_remote = args.skip_remote;
    config.flags.skip_cleanup = args.skip_cleanup;
    config.flags.verbose = args.verbose;

    if let Err(e) = utils::logger::init(&config.log.level, args.verbose) {
        eprintln!("nightly-backup: failed to initialize logging: {:#}", e);
        return ExitCode::from(EXIT_FAILURE);
    }

    let now = match args.date {
        Some(date) => date.and_time(Local::now().time()),
        None => Local::now().naive_local(),
    };

    tracing::info!(
        "Starting nightly-backup v{} on {} ({} item(s))",
        env!("CARGO_PKG_VERSION"),
        config.host_fqdn(),
        config.items.len()
    );

    let orchestrator = Orchestrator::new(config, ItemRegistry::with_builtins());
    match orchestrator.run(now).await {
        Ok(report) => {
            if let Some(mirror) = &report.mirror {
                tracing::info!(
                    "Mirrored {} artifact(s) ({}), skipped {}",
                    mirror.uploaded.len(),
                    format_size(mirror.bytes),
                    mirror.skipped.len()
                );
            }
            tracing::info!(
                "Backup {} complete: {} artifact(s), {} local and {} remote backup(s) pruned",
                report.date_key,
                report.artifacts.len(),
                report.pruned_local.len(),
                report.pruned_remote.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Backup failed: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
