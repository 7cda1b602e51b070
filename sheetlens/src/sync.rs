//! sheetlens-sync - fetch the connected sheet and analyze every row
//!
//! Runs one sync session: fetch, parse, per-row analysis and the
//! meta-analysis refresh. Press Ctrl+C to stop issuing new requests; rows
//! already in flight finish and nothing is saved.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/sheetlens/data.db (~/.local/share/sheetlens/data.db)
//! - Logs: $XDG_STATE_HOME/sheetlens/sheetlens.log (~/.local/state/sheetlens/sheetlens.log)
//! - Config: $XDG_CONFIG_HOME/sheetlens/config.toml (~/.config/sheetlens/config.toml)

mod context;
mod process_lock;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use process_lock::acquire_sync_guard;
use sheetlens_core::sync::DryRun;
use sheetlens_core::{Config, SessionStore, SyncOutcome, SyncReport};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "sheetlens-sync")]
#[command(about = "Sync the connected spreadsheet and analyze its rows")]
#[command(version)]
struct Args {
    /// Verbose output (-v per-row failures, -vv phase transitions)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Dry run - fetch and classify rows but don't call the model
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let startup = context::startup("sheetlens-sync")?;
    let config = &startup.config;

    // One sync per database at a time
    let db_path = Config::database_path();
    let _sync_guard = acquire_sync_guard(&db_path).context("failed to acquire process lock")?;

    let db = context::open_database()?;
    let sync_config = db.load_sync_config().context("failed to read sync settings")?;
    if !sync_config.is_ready() {
        anyhow::bail!("no spreadsheet connected\n  hint: run 'sheetlens-connect <spreadsheet-id>' first");
    }

    println!(
        "Spreadsheet: {} (sheet '{}')",
        sync_config.source_id, sync_config.sheet_name
    );
    if let Some(last) = sync_config.last_sync_time {
        println!(
            "Last sync:   {}",
            last.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
        );
    }

    let mut controller = context::open_controller(config, db)?;

    if args.dry_run {
        let dry = match controller.dry_run().await {
            Ok(dry) => dry,
            Err(e) => anyhow::bail!("dry run failed: {}", context::explain(&e)),
        };
        print_dry_run(&dry, args.verbose);
        println!("\nDry run - no model calls made");
        tracing::info!("Dry run complete");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling - waiting for in-flight rows...");
        on_signal.cancel();
    })
    .context("failed to set Ctrl+C handler")?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} rows {msg}")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let result = controller
        .sync_with_progress(&cancel, |finished, total| {
            pb.set_length(total as u64);
            pb.set_position(finished as u64);
        })
        .await;
    pb.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(e) if e.is_session_fatal() => {
            tracing::error!(phase = %controller.phase(), error = %e, "Sync failed");
            anyhow::bail!("sync failed: {}", context::explain(&e));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("sync aborted during {}", controller.phase()));
        }
    };

    print_sync_report(&report, args.verbose);
    Ok(())
}

fn print_dry_run(dry: &DryRun, verbose: u8) {
    println!("\nColumns: {}", dry.headers.join(", "));
    println!("Rows:            {}", dry.rows);
    println!("Would analyze:   {}", dry.selection.targets.len());
    println!("Skipped (empty): {}", dry.selection.skipped.len());

    if verbose >= 1 {
        println!("\nRows to analyze:");
        for target in &dry.selection.targets {
            println!(
                "  row {}: [{}] {} ({} chars)",
                target.row + 1,
                target.category,
                target.label,
                target.content.chars().count()
            );
        }
    }
}

fn print_sync_report(report: &SyncReport, verbose: u8) {
    let heading = match report.outcome {
        SyncOutcome::Completed => "Sync complete:",
        SyncOutcome::PartiallyCompleted => "Sync complete (some rows failed):",
        SyncOutcome::NothingUsable => "Connected, but nothing usable was produced:",
        SyncOutcome::Cancelled => "Sync cancelled (nothing saved):",
    };
    println!("\n{heading}");
    println!("  Rows in sheet:    {}", report.rows);
    println!("  Rows attempted:   {}", report.attempted);
    println!("  Rows analyzed:    {}", report.succeeded);
    println!("  Skipped (empty):  {}", report.skipped);
    if report.not_started > 0 {
        println!("  Not started:      {}", report.not_started);
    }

    if verbose >= 2 {
        let phases: Vec<String> = report.transitions.iter().map(|p| p.to_string()).collect();
        println!("  Phases:           {}", phases.join(" -> "));
    }

    if !report.failures.is_empty() {
        println!("\nFailed rows ({}):", report.failures.len());
        if verbose >= 1 {
            for failure in &report.failures {
                println!("  row {} ({}): {}", failure.row + 1, failure.label, failure.error);
            }
        } else {
            println!("  run with -v for details");
        }
    }

    if let Some(e) = &report.meta_error {
        println!("\nMeta-analysis not refreshed: {}", e);
        println!("  the previous report is still available via 'sheetlens-report meta'");
    }

    if report.outcome == SyncOutcome::NothingUsable {
        println!("\nPrevious reports were kept. Check that the sheet has a Transcript or Text column.");
    }
}
