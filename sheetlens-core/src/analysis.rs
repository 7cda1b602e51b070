//! Per-record structured extraction
//!
//! [`AnalysisOrchestrator`] sends one request per [`AnalysisTarget`] with
//! bounded fan-out. Each record either yields an [`AnalysisResult`] or a
//! [`RecordFailure`]; a failing record never aborts the batch. Results arrive
//! in completion order, not sheet order.
//!
//! Cancellation is checked before each record's request is issued: requests
//! already in flight finish, nothing new starts.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::classify::AnalysisTarget;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{self, schema, GenerationRequest, ModelBackend};
use crate::types::{AnalysisResult, MetricSet};

/// Knobs for the per-record requests
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub model: String,
    pub system_instruction: String,
    /// Maximum requests in flight
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_content_chars: usize,
}

impl AnalysisSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.llm.model.clone(),
            system_instruction: config.prompts.analysis.clone(),
            concurrency: config.pipeline.concurrency,
            timeout: config.llm.timeout(),
            max_content_chars: config.pipeline.max_content_chars,
        }
    }
}

/// A record whose analysis failed
#[derive(Debug)]
pub struct RecordFailure {
    /// Position of the record in the sheet
    pub row: usize,
    pub label: String,
    /// Always [`Error::RecordAnalysis`]
    pub error: Error,
}

/// Everything one batch produced
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<AnalysisResult>,
    pub failures: Vec<RecordFailure>,
    /// Records never sent because the batch was cancelled
    pub not_started: usize,
}

impl BatchOutcome {
    /// Records for which a request was issued
    pub fn attempted(&self) -> usize {
        self.results.len() + self.failures.len()
    }
}

/// Model response for one record
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    summary: String,
    insights: Vec<String>,
    metrics: MetricSet,
}

pub struct AnalysisOrchestrator {
    backend: Arc<dyn ModelBackend>,
    settings: AnalysisSettings,
}

impl AnalysisOrchestrator {
    pub fn new(backend: Arc<dyn ModelBackend>, settings: AnalysisSettings) -> Self {
        Self { backend, settings }
    }

    /// Analyze a single record
    pub async fn analyze_record(&self, target: &AnalysisTarget) -> Result<AnalysisResult> {
        let content = truncate_chars(&target.content, self.settings.max_content_chars);
        let request = GenerationRequest {
            model: self.settings.model.clone(),
            prompt: format!(
                "Analyze this {} record. Extract metrics and summarize: \n\n {}",
                target.category, content
            ),
            system_instruction: self.settings.system_instruction.clone(),
            schema: schema::analysis(),
        };

        let raw = llm::with_timeout(
            "record analysis",
            self.settings.timeout,
            self.backend.generate(&request),
        )
        .await?;

        let payload: AnalysisPayload = llm::decode(&raw)?;
        let metrics = payload.metrics.normalized().ok_or_else(|| {
            Error::SchemaViolation("metrics contain non-finite numbers".to_string())
        })?;

        Ok(AnalysisResult {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            category: target.category,
            label: target.label.clone(),
            summary: payload.summary,
            insights: payload.insights,
            metrics,
            raw_text: target.content.clone(),
        })
    }

    /// Analyze every target, isolating failures per record
    pub async fn analyze_all(
        &self,
        targets: Vec<AnalysisTarget>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        self.analyze_all_with_progress(targets, cancel, |_, _| {})
            .await
    }

    /// Like [`Self::analyze_all`], calling `on_progress(finished, total)`
    /// after each record settles.
    pub async fn analyze_all_with_progress<F>(
        &self,
        targets: Vec<AnalysisTarget>,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> BatchOutcome
    where
        F: Fn(usize, usize),
    {
        let total = targets.len();
        let mut outcome = BatchOutcome::default();

        let mut settled = stream::iter(targets)
            .map(|target| async move {
                if cancel.is_cancelled() {
                    return (target, None);
                }
                let result = self.analyze_record(&target).await;
                (target, Some(result))
            })
            .buffer_unordered(self.settings.concurrency.max(1));

        let mut finished = 0;
        while let Some((target, attempt)) = settled.next().await {
            match attempt {
                None => outcome.not_started += 1,
                Some(Ok(result)) => {
                    tracing::debug!(row = target.row, label = %target.label, "Record analyzed");
                    outcome.results.push(result);
                }
                Some(Err(error)) => {
                    tracing::warn!(
                        row = target.row,
                        label = %target.label,
                        error = %error,
                        "Record analysis failed"
                    );
                    outcome.failures.push(RecordFailure {
                        row: target.row,
                        label: target.label.clone(),
                        error: Error::RecordAnalysis {
                            record: target.label,
                            source: Box::new(error),
                        },
                    });
                }
            }
            finished += 1;
            on_progress(finished, total);
        }

        tracing::info!(
            total,
            succeeded = outcome.results.len(),
            failed = outcome.failures.len(),
            not_started = outcome.not_started,
            "Analysis batch finished"
        );
        outcome
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}\n...[truncated]", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}
