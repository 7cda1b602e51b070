//! sheetlens-connect - point sheetlens at a spreadsheet
//!
//! Stores the spreadsheet ID and tab name in the configuration store so
//! `sheetlens-sync` knows what to fetch. The sheet must be shared as
//! "anyone with the link can view".
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/sheetlens/data.db (~/.local/share/sheetlens/data.db)
//! - Logs: $XDG_STATE_HOME/sheetlens/sheetlens.log (~/.local/state/sheetlens/sheetlens.log)
//! - Config: $XDG_CONFIG_HOME/sheetlens/config.toml (~/.config/sheetlens/config.toml)

mod context;

use anyhow::Result;
use clap::Parser;
use sheetlens_core::sync;

#[derive(Parser)]
#[command(name = "sheetlens-connect")]
#[command(about = "Connect sheetlens to a Google Sheets spreadsheet")]
#[command(version)]
struct Args {
    /// Spreadsheet ID, or the full sheet URL
    source: String,

    /// Tab to read (defaults to Sheet1)
    #[arg(short, long)]
    sheet: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _startup = context::startup("sheetlens-connect")?;
    let db = context::open_database()?;

    let config = match sync::connect(db.as_ref(), &args.source, args.sheet.as_deref()) {
        Ok(config) => config,
        Err(e) => anyhow::bail!("failed to connect spreadsheet: {}", context::explain(&e)),
    };

    println!("Connected spreadsheet:");
    println!("  Spreadsheet ID: {}", config.source_id);
    println!("  Sheet:          {}", config.sheet_name);
    if let Some(prompt) = config.prompt() {
        println!("  Analysis prompt: {}", prompt);
    }
    println!("\nRun 'sheetlens-sync' to analyze it.");
    Ok(())
}
