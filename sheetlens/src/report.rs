//! sheetlens-report - read the derived reports for the connected sheet
//!
//! Subcommands:
//! - `list`      stored per-row analyses (no model calls)
//! - `meta`      feature cards and executive narrative, optionally re-guided
//!   with `--prompt`
//! - `dossiers`  yes/no, opportunities/threats and act-now items
//! - `columns`   themes over chosen columns of the live sheet

mod context;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sheetlens_core::aggregate::column_letter;
use sheetlens_core::{
    AnalysisResult, ColumnSummary, MetaAnalysis, SessionStore, StrategicDossiers, SyncConfig,
};

#[derive(Parser)]
#[command(name = "sheetlens-report")]
#[command(about = "Show analyses and synthesized reports")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Command {
    /// List the stored per-row analyses
    List,
    /// Feature cards and executive narrative
    Meta {
        /// Replace the analysis prompt and re-synthesize ("" clears it)
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Strategic dossiers (cached until the reports change)
    Dossiers {
        /// Regenerate even if the cached dossiers are current
        #[arg(long)]
        force: bool,
    },
    /// Summarize chosen columns of the live sheet
    Columns {
        /// Column letters (A, B, AA) or 1-based numbers
        #[arg(required = true, value_parser = parse_column)]
        columns: Vec<usize>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// JSON shape of `list`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListOutput<'a> {
    source_id: &'a str,
    sheet_name: &'a str,
    last_sync_time: Option<chrono::DateTime<chrono::Utc>>,
    reports: &'a [AnalysisResult],
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let startup = context::startup("sheetlens-report")?;
    let db = context::open_database()?;

    match args.command {
        Command::List => {
            let sync_config = db.load_sync_config().context("failed to read sync settings")?;
            let reports = db.load_reports().context("failed to read reports")?;
            print_list(&sync_config, &reports, args.format)
        }
        Command::Meta { prompt } => {
            let mut controller = context::open_controller(&startup.config, db)?;
            let result = match prompt {
                Some(prompt) => controller.set_analysis_prompt(&prompt).await,
                None => controller.meta_analysis().await,
            };
            let meta = result.map_err(|e| anyhow::anyhow!(context::explain(&e)))?;
            emit(&meta, args.format, print_meta)
        }
        Command::Dossiers { force } => {
            let mut controller = context::open_controller(&startup.config, db)?;
            let dossiers = controller
                .dossiers(force)
                .await
                .map_err(|e| anyhow::anyhow!(context::explain(&e)))?;
            emit(&dossiers, args.format, print_dossiers)
        }
        Command::Columns { columns } => {
            let controller = context::open_controller(&startup.config, db)?;
            let summary = controller
                .column_summary(&columns)
                .await
                .map_err(|e| anyhow::anyhow!(context::explain(&e)))?;
            if args.format == OutputFormat::Text {
                let names: Vec<String> = columns.iter().map(|&i| column_letter(i)).collect();
                println!("Columns: {}\n", names.join(", "));
            }
            emit(&summary, args.format, print_column_summary)
        }
    }
}

/// Accept `B`/`aa` style letters or 1-based numbers; returns a 0-based index
fn parse_column(value: &str) -> std::result::Result<usize, String> {
    let value = value.trim();
    if let Ok(number) = value.parse::<usize>() {
        return number
            .checked_sub(1)
            .ok_or_else(|| "column numbers start at 1".to_string());
    }
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("'{value}' is not a column letter or number"));
    }
    let index = value
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize);
    Ok(index - 1)
}

fn emit<T: Serialize>(value: &T, format: OutputFormat, text: fn(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(value).context("failed to encode JSON")?
            );
        }
        OutputFormat::Text => text(value),
    }
    Ok(())
}

fn print_list(config: &SyncConfig, reports: &[AnalysisResult], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        let output = ListOutput {
            source_id: &config.source_id,
            sheet_name: &config.sheet_name,
            last_sync_time: config.last_sync_time,
            reports,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("failed to encode JSON")?
        );
        return Ok(());
    }

    if reports.is_empty() {
        println!("No reports yet.");
        println!("Run 'sheetlens-sync' to analyze the connected sheet.");
        return Ok(());
    }

    println!("{} report(s):\n", reports.len());
    println!(
        "{:<24} {:<18} {:>6} {:>6} {:>6}  SUMMARY",
        "LABEL", "CATEGORY", "CONV", "SENT", "CHURN"
    );
    for report in reports {
        println!(
            "{:<24} {:<18} {:>6.0} {:>6.0} {:>6.0}  {}",
            truncate(&report.label, 24),
            report.category.as_str(),
            report.metrics.conversion_probability,
            report.metrics.customer_sentiment,
            report.metrics.churn_risk,
            truncate(&report.summary, 60)
        );
    }
    Ok(())
}

fn print_meta(meta: &MetaAnalysis) {
    println!("{}\n", meta.executive_narrative);
    if meta.top_features.is_empty() {
        return;
    }
    println!("Top features:");
    for card in &meta.top_features {
        println!("  [{:>3.0}] {}", card.impact_score, card.title);
        println!("        {}", card.description);
    }
}

fn print_dossiers(dossiers: &StrategicDossiers) {
    println!("Why yes / why no:\n  {}\n", dossiers.yes_no);
    println!("Opportunities & threats:\n  {}\n", dossiers.opps_threats);
    println!("Act now:");
    for (i, item) in dossiers.act_now.iter().enumerate() {
        println!("  {}. {}", i + 1, item);
    }
}

fn print_column_summary(summary: &ColumnSummary) {
    println!("{}\n", summary.summary);
    if !summary.key_themes.is_empty() {
        println!("Key themes: {}", summary.key_themes.join(", "));
    }
    for insight in &summary.insights {
        println!("  - {}", insight);
    }
}

fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column_letters_and_numbers() {
        assert_eq!(parse_column("A"), Ok(0));
        assert_eq!(parse_column("b"), Ok(1));
        assert_eq!(parse_column("AA"), Ok(26));
        assert_eq!(parse_column("3"), Ok(2));
        assert!(parse_column("0").is_err());
        assert!(parse_column("B2").is_err());
    }

    #[test]
    fn test_parse_column_matches_letter_rendering() {
        for index in [0, 25, 26, 51, 701, 702] {
            assert_eq!(parse_column(&column_letter(index)), Ok(index));
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer summary", 10), "a much ...");
        assert_eq!(truncate("first\nsecond", 20), "first");
    }
}
