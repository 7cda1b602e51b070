//! # sheetlens-core
//!
//! Core library for sheetlens - turns spreadsheet rows into structured
//! model analyses and whole-collection reports.
//!
//! This library provides:
//! - Sheet export fetching and envelope decoding
//! - Row classification with a configurable alias table
//! - Per-record structured extraction with bounded fan-out
//! - Meta-analysis, strategic dossiers and column summaries
//! - A SQLite configuration store
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A sync session flows through the pipeline in order:
//! - **Fetch:** raw export text from the spreadsheet endpoint
//! - **Parse:** envelope → [`sheet::RawTable`] → ordered [`Record`]s
//! - **Analyze:** one [`AnalysisResult`] per record with content
//! - **Aggregate:** derived views over the report collection (regenerable)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sheetlens_core::{Config, Database, HttpModelBackend, HttpSheetFetcher, SyncController};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> sheetlens_core::Result<()> {
//! let config = Config::load()?;
//! let db = Database::open(&Config::database_path())?;
//! db.migrate()?;
//!
//! let mut controller = SyncController::new(
//!     &config,
//!     Arc::new(HttpSheetFetcher::new(&config.sheet)?),
//!     Arc::new(HttpModelBackend::new(&config.llm)?),
//!     Arc::new(db),
//! )?;
//! controller.connect("1AbCdEf", None)?;
//! let report = controller.sync(&CancellationToken::new()).await?;
//! println!("{} of {} records analyzed", report.succeeded, report.attempted);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{Database, SessionStore};
pub use error::{Error, RemoteErrorKind, Result};
pub use llm::{HttpModelBackend, ModelBackend};
pub use sheet::{HttpSheetFetcher, SheetFetcher};
pub use sync::{SyncController, SyncOutcome, SyncPhase, SyncReport};
pub use types::*;

// Public modules
pub mod aggregate;
pub mod analysis;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod sheet;
pub mod sync;
pub mod types;
pub mod views;
