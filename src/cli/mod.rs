//! Top-level CLI definition and dispatch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use parking_lot::Mutex;
use serde_json::json;

use crate::core::config::EngineConfig;
use crate::core::errors::Result;
use crate::job::autoscan::{AutoScanDriver, next_tick_sleep};
use crate::job::{JobContext, JobQueue};
use crate::logger::dual::{DualLoggerConfig, spawn_logger};
use crate::scanner::diff::DiffEngine;
use crate::scanner::engine::ScanEngine;
use crate::status::StatusReporter;
use crate::store::RecordStore;

/// gallery-sync — scan engine CLI.
#[derive(Debug, Parser)]
#[command(
    name = "gallery-sync",
    author,
    version,
    about = "Gallery sync scan engine",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Emit machine-readable JSON instead of a human summary.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan (and by default execute) a single scan over configured sources.
    Scan(ScanArgs),
    /// Report new/changed/missing/unchanged outputs relative to the record store.
    Diff(DiffArgs),
    /// Run the job worker and auto-scan tick loop in the foreground.
    Worker(WorkerArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct ScanArgs {
    /// Only plan; never touch the output tree or the record store.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct DiffArgs {}

#[derive(Debug, Clone, Args, Default)]
struct WorkerArgs {}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Scan(args) => run_scan(cli, args),
        Command::Diff(args) => run_diff(cli, args),
        Command::Worker(args) => run_worker(cli, args),
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    EngineConfig::load(cli.config.as_deref())
}

#[cfg(feature = "sqlite")]
fn open_store(cfg: &EngineConfig) -> Result<Arc<dyn RecordStore>> {
    let path = cfg.roots.config_root.join("records.sqlite3");
    let store = crate::store::sqlite::SqliteRecordStore::open(&path)?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
fn open_store(_cfg: &EngineConfig) -> Result<Arc<dyn RecordStore>> {
    Ok(Arc::new(crate::store::memory::InMemoryRecordStore::new()))
}

fn run_scan(cli: &Cli, args: &ScanArgs) -> Result<()> {
    let cfg = load_config(cli)?;
    let store = open_store(&cfg)?;
    let status = Arc::new(StatusReporter::new());
    let (activity, _join) = spawn_logger(DualLoggerConfig::default())?;

    let engine = ScanEngine::new(
        Arc::new(Mutex::new(cfg)),
        store,
        status,
        Some(activity.clone()),
    );
    let result = engine.run_scan(JobContext { job_id: 0 }, args.dry_run)?;
    activity.shutdown();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "planned={} skipped={} warnings={}",
            result.summary.planned,
            result.summary.skipped,
            result.warnings.len()
        );
        for warning in &result.warnings {
            println!("warning: {warning}");
        }
    }
    Ok(())
}

fn run_diff(cli: &Cli, _args: &DiffArgs) -> Result<()> {
    let cfg = load_config(cli)?;
    let store = open_store(&cfg)?;
    let report = DiffEngine::new().diff(&cfg, store.as_ref())?;

    if cli.json {
        let payload = json!({
            "new": report.new.len(),
            "unchanged": report.unchanged.len(),
            "changed": report.changed.len(),
            "missing": report.missing.len(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "new={} unchanged={} changed={} missing={}",
            report.new.len(),
            report.unchanged.len(),
            report.changed.len(),
            report.missing.len()
        );
    }
    Ok(())
}

fn run_worker(cli: &Cli, _args: &WorkerArgs) -> Result<()> {
    let cfg = load_config(cli)?;
    let config = Arc::new(Mutex::new(cfg));
    let store = open_store(&config.lock())?;
    let status = Arc::new(StatusReporter::new());
    let (activity, _join) = spawn_logger(DualLoggerConfig::default())?;

    let engine = Arc::new(ScanEngine::new(
        Arc::clone(&config),
        Arc::clone(&store),
        Arc::clone(&status),
        Some(activity.clone()),
    ));
    let queue = JobQueue::spawn(64, Some(activity.clone()));
    let auto_scan = AutoScanDriver::new(Arc::clone(&config));

    println!("worker running, press Ctrl+C to stop");
    loop {
        if queue.is_busy() {
            std::thread::sleep(Duration::from_secs(1));
            continue;
        }

        let auto_scan_enabled = config.lock().settings.auto_scan_enabled;
        if let Some(reason) = auto_scan.evaluate(chrono::Utc::now()) {
            let name = format!("scan_auto_{}", reason.as_job_suffix());
            let engine_for_job = Arc::clone(&engine);
            queue.enqueue(name, move |ctx: JobContext| {
                engine_for_job.run_scan(ctx, false).map(|_| ())
            })?;
        }

        std::thread::sleep(next_tick_sleep(auto_scan_enabled));
    }
}
