//! Sync session state machine
//!
//! [`SyncController`] drives one session end to end:
//!
//! ```text
//! Idle → Fetching → Parsing → Analyzing → Aggregating → Idle
//!           │          │
//!           └──────────┴──→ Failed
//! ```
//!
//! Fetch and parse errors are fatal for the session. Per-record failures and
//! synthesis failures are collected into the [`SyncReport`] and the session
//! still returns to `Idle`.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{Aggregator, SynthesisSettings};
use crate::analysis::{AnalysisOrchestrator, AnalysisSettings, RecordFailure};
use crate::classify::{AliasTable, RecordClassifier, Selection};
use crate::config::Config;
use crate::db::SessionStore;
use crate::error::{Error, Result};
use crate::llm::ModelBackend;
use crate::sheet::{self, RawTable, SheetFetcher};
use crate::types::{
    AnalysisResult, ColumnSummary, MetaAnalysis, StrategicDossiers, SyncConfig,
    DEFAULT_SHEET_NAME,
};
use crate::views::DerivedViews;

/// Where the current session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Parsing,
    Analyzing,
    Aggregating,
    /// Fetch or parse failed; no table was produced
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Parsing => "parsing",
            SyncPhase::Analyzing => "analyzing",
            SyncPhase::Aggregating => "aggregating",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a session that reached `Idle` went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every attempted record was analyzed
    Completed,
    /// Some records failed; the rest were aggregated
    PartiallyCompleted,
    /// Connected, but no record produced a usable analysis
    NothingUsable,
    /// Cancelled during analysis; nothing was persisted
    Cancelled,
}

/// What one sync session did
#[derive(Debug)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Data rows in the sheet
    pub rows: usize,
    /// Records sent to the model
    pub attempted: usize,
    pub succeeded: usize,
    /// Rows excluded because their content was empty
    pub skipped: usize,
    pub failures: Vec<RecordFailure>,
    /// Records never sent because of cancellation
    pub not_started: usize,
    /// Set when the meta-analysis refresh failed; the previous view is kept
    pub meta_error: Option<Error>,
    /// Phases entered, in order
    pub transitions: Vec<SyncPhase>,
}

/// Fetch/parse/classify result without model calls
#[derive(Debug)]
pub struct DryRun {
    pub headers: Vec<String>,
    pub rows: usize,
    pub selection: Selection,
}

/// Point the pipeline at a spreadsheet and mark it connected.
///
/// `source_id` may be a bare ID or a full sheet URL. The analysis prompt
/// survives reconnects; the last sync time is reset when the source changes.
pub fn connect(
    store: &dyn SessionStore,
    source_id: &str,
    sheet_name: Option<&str>,
) -> Result<SyncConfig> {
    let source_id = sheet::normalize_source_id(source_id);
    if source_id.is_empty() {
        return Err(Error::Config("spreadsheet ID must not be empty".to_string()));
    }
    let sheet_name = sheet_name
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SHEET_NAME)
        .to_string();

    let previous = store.load_sync_config()?;
    let same_source = previous.source_id == source_id && previous.sheet_name == sheet_name;
    let config = SyncConfig {
        source_id,
        sheet_name,
        last_sync_time: if same_source {
            previous.last_sync_time
        } else {
            None
        },
        connected: true,
        analysis_prompt: previous.analysis_prompt,
    };
    store.save_sync_config(&config)?;

    tracing::info!(
        source_id = %config.source_id,
        sheet = %config.sheet_name,
        "Connected spreadsheet"
    );
    Ok(config)
}

/// Composes fetch, parse, classification, analysis and aggregation.
///
/// Holds the current report collection and the derived-view cache. Taking
/// `&mut self` for a sync keeps sessions on one controller serialized.
pub struct SyncController {
    fetcher: Arc<dyn SheetFetcher>,
    store: Arc<dyn SessionStore>,
    classifier: RecordClassifier,
    orchestrator: AnalysisOrchestrator,
    aggregator: Aggregator,
    views: DerivedViews,
    reports: Vec<AnalysisResult>,
    phase: SyncPhase,
    transitions: Vec<SyncPhase>,
}

impl SyncController {
    /// Build a controller and load the stored report collection
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn SheetFetcher>,
        backend: Arc<dyn ModelBackend>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let reports = store.load_reports()?;
        tracing::debug!(reports = reports.len(), "Loaded stored reports");

        let mut views = DerivedViews::new();
        if let Some(snapshot) = store.load_dossiers()? {
            views.restore_dossiers(snapshot);
        }

        Ok(Self {
            fetcher,
            classifier: RecordClassifier::new(AliasTable::from(&config.classifier)),
            orchestrator: AnalysisOrchestrator::new(
                backend.clone(),
                AnalysisSettings::from_config(config),
            ),
            aggregator: Aggregator::new(backend, SynthesisSettings::from_config(config)),
            store,
            views,
            reports,
            phase: SyncPhase::Idle,
            transitions: Vec::new(),
        })
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Current report collection
    pub fn reports(&self) -> &[AnalysisResult] {
        &self.reports
    }

    pub fn sync_config(&self) -> Result<SyncConfig> {
        self.store.load_sync_config()
    }

    /// Last meta-analysis computed by this controller, possibly stale
    pub fn cached_meta(&self) -> Option<&MetaAnalysis> {
        self.views.cached_meta()
    }

    /// See [`connect`]
    pub fn connect(&mut self, source_id: &str, sheet_name: Option<&str>) -> Result<SyncConfig> {
        connect(self.store.as_ref(), source_id, sheet_name)
    }

    /// Persist a new analysis prompt and re-synthesize the meta-analysis.
    ///
    /// A blank prompt clears it. The prompt is saved even if synthesis fails.
    pub async fn set_analysis_prompt(&mut self, prompt: &str) -> Result<MetaAnalysis> {
        let mut config = self.store.load_sync_config()?;
        let prompt = prompt.trim();
        config.analysis_prompt = (!prompt.is_empty()).then(|| prompt.to_string());
        self.store.save_sync_config(&config)?;
        tracing::info!(has_prompt = config.analysis_prompt.is_some(), "Analysis prompt updated");

        let meta = self
            .views
            .meta(&self.aggregator, &self.reports, config.prompt())
            .await?;
        Ok(meta.clone())
    }

    /// Run one sync session
    pub async fn sync(&mut self, cancel: &CancellationToken) -> Result<SyncReport> {
        self.sync_with_progress(cancel, |_, _| {}).await
    }

    /// Run one sync session, calling `on_progress(finished, total)` as
    /// records settle.
    pub async fn sync_with_progress<F>(
        &mut self,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<SyncReport>
    where
        F: Fn(usize, usize),
    {
        let mut config = self.store.load_sync_config()?;
        if !config.is_ready() {
            return Err(Error::NotConnected);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.transitions.clear();

        self.enter(SyncPhase::Fetching);
        let fetched = self
            .fetcher
            .fetch(&config.source_id, &config.sheet_name)
            .await;
        let body = match fetched {
            Ok(body) => body,
            Err(e) => return Err(self.fail(e)),
        };

        self.enter(SyncPhase::Parsing);
        let records = match sheet::parse_response(&body) {
            Ok(table) => sheet::map_rows(&table),
            Err(e) => return Err(self.fail(e)),
        };
        if records.is_empty() {
            return Err(self.fail(Error::EmptyResult));
        }
        let rows = records.len();
        let selection = self.classifier.select(&records);
        let skipped = selection.skipped.len();
        tracing::info!(rows, included = selection.targets.len(), skipped, "Parsed sheet");

        self.enter(SyncPhase::Analyzing);
        let batch = self
            .orchestrator
            .analyze_all_with_progress(selection.targets, cancel, on_progress)
            .await;
        let attempted = batch.attempted();
        let succeeded = batch.results.len();

        let mut report = SyncReport {
            outcome: SyncOutcome::Completed,
            rows,
            attempted,
            succeeded,
            skipped,
            failures: batch.failures,
            not_started: batch.not_started,
            meta_error: None,
            transitions: Vec::new(),
        };

        if cancel.is_cancelled() {
            tracing::info!(attempted, succeeded, "Sync cancelled before aggregation");
            report.outcome = SyncOutcome::Cancelled;
            self.enter(SyncPhase::Idle);
            report.transitions = self.transitions.clone();
            return Ok(report);
        }

        report.outcome = if succeeded == 0 {
            SyncOutcome::NothingUsable
        } else if report.failures.is_empty() {
            SyncOutcome::Completed
        } else {
            SyncOutcome::PartiallyCompleted
        };

        self.enter(SyncPhase::Aggregating);
        if succeeded > 0 {
            if let Err(e) = self.store.save_reports(&batch.results) {
                return Err(self.fail(e));
            }
            self.reports = batch.results;
        } else {
            tracing::warn!(attempted, "No usable analyses; keeping previous reports");
        }

        if let Err(e) = self
            .views
            .meta(&self.aggregator, &self.reports, config.prompt())
            .await
        {
            tracing::warn!(error = %e, "Meta-analysis refresh failed; keeping previous view");
            report.meta_error = Some(e);
        }

        config.last_sync_time = Some(Utc::now());
        if let Err(e) = self.store.save_sync_config(&config) {
            return Err(self.fail(e));
        }

        self.enter(SyncPhase::Idle);
        report.transitions = self.transitions.clone();
        tracing::info!(
            outcome = ?report.outcome,
            attempted,
            succeeded,
            failed = report.failures.len(),
            "Sync finished"
        );
        Ok(report)
    }

    /// Fetch and parse the connected sheet
    pub async fn fetch_table(&self) -> Result<RawTable> {
        let config = self.store.load_sync_config()?;
        if !config.is_ready() {
            return Err(Error::NotConnected);
        }
        let body = self
            .fetcher
            .fetch(&config.source_id, &config.sheet_name)
            .await?;
        sheet::parse_response(&body)
    }

    /// Fetch, parse and classify without calling the model
    pub async fn dry_run(&self) -> Result<DryRun> {
        let table = self.fetch_table().await?;
        let records = sheet::map_rows(&table);
        Ok(DryRun {
            headers: table.headers(),
            rows: records.len(),
            selection: self.classifier.select(&records),
        })
    }

    /// Meta-analysis of the current collection under the stored prompt
    pub async fn meta_analysis(&mut self) -> Result<MetaAnalysis> {
        let config = self.store.load_sync_config()?;
        let meta = self
            .views
            .meta(&self.aggregator, &self.reports, config.prompt())
            .await?;
        Ok(meta.clone())
    }

    /// Strategic dossiers, served from cache unless `force` is set or the
    /// collection changed. Fresh dossiers are snapshotted to the store.
    pub async fn dossiers(&mut self, force: bool) -> Result<StrategicDossiers> {
        let fresh = force || !self.views.dossiers_are_current(&self.reports);
        let dossiers = self
            .views
            .dossiers(&self.aggregator, &self.reports, force)
            .await?
            .clone();
        if fresh {
            if let Some(snapshot) = self.views.dossier_snapshot() {
                self.store.save_dossiers(&snapshot)?;
            }
        }
        Ok(dossiers)
    }

    /// Thematic summary over the chosen columns of the live sheet
    pub async fn column_summary(&self, column_indices: &[usize]) -> Result<ColumnSummary> {
        let table = match self.fetch_table().await {
            Ok(table) => table,
            Err(Error::EmptyResult) => return Ok(ColumnSummary::no_data()),
            Err(e) => return Err(e),
        };
        self.aggregator
            .synthesize_column_summary(&table.text_rows(), column_indices, &table.headers())
            .await
    }

    fn enter(&mut self, phase: SyncPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "Sync phase transition");
        self.phase = phase;
        self.transitions.push(phase);
    }

    fn fail(&mut self, error: Error) -> Error {
        tracing::error!(phase = %self.phase, error = %error, "Sync failed");
        self.enter(SyncPhase::Failed);
        error
    }
}
