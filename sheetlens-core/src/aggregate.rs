//! Whole-collection synthesis
//!
//! Three independent operations over the report collection. Each one returns
//! a documented sentinel for empty input without calling the model, and wraps
//! any backend or decoding failure in [`Error::Synthesis`]. A failed
//! synthesis leaves whatever view the caller already holds untouched.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{self, schema, GenerationRequest, ModelBackend};
use crate::types::{AnalysisResult, ColumnSummary, MetaAnalysis, StrategicDossiers};

/// Knobs for aggregation requests
#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    pub model: String,
    pub timeout: Duration,
    pub meta_instruction: String,
    /// Used when the caller supplies no analysis prompt
    pub default_meta_prompt: String,
    pub dossier_instruction: String,
    pub column_instruction: String,
}

impl SynthesisSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.llm.synthesis_model().to_string(),
            timeout: config.llm.timeout(),
            meta_instruction: config.prompts.meta.clone(),
            default_meta_prompt: config.prompts.default_meta_prompt.clone(),
            dossier_instruction: config.prompts.dossiers.clone(),
            column_instruction: config.prompts.columns.clone(),
        }
    }
}

pub struct Aggregator {
    backend: Arc<dyn ModelBackend>,
    settings: SynthesisSettings,
}

impl Aggregator {
    pub fn new(backend: Arc<dyn ModelBackend>, settings: SynthesisSettings) -> Self {
        Self { backend, settings }
    }

    /// Feature cards and executive narrative, guided by `prompt`
    pub async fn synthesize_meta(
        &self,
        results: &[AnalysisResult],
        prompt: Option<&str>,
    ) -> Result<MetaAnalysis> {
        if results.is_empty() {
            return Ok(MetaAnalysis::no_data());
        }

        let data = results
            .iter()
            .map(|r| format!("Summary: {}", r.summary))
            .collect::<Vec<_>>()
            .join("\n---\n");
        let guidance = prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.settings.default_meta_prompt);

        self.request(
            "meta-analysis",
            format!("{guidance}\n\nDATA:\n{data}"),
            &self.settings.meta_instruction,
            schema::meta_analysis(),
        )
        .await
    }

    /// Yes/no, opportunities/threats and act-now dossiers
    pub async fn synthesize_dossiers(
        &self,
        results: &[AnalysisResult],
    ) -> Result<StrategicDossiers> {
        if results.is_empty() {
            return Ok(StrategicDossiers::default());
        }

        let data = results
            .iter()
            .map(|r| {
                format!(
                    "Sentiment: {}%, Summary: {}",
                    r.metrics.customer_sentiment, r.summary
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n");

        let dossiers: StrategicDossiers = self
            .request(
                "dossier",
                format!("Synthesize this intelligence into strategic dossiers:\n\n{data}"),
                &self.settings.dossier_instruction,
                schema::dossiers(),
            )
            .await?;

        if !(6..=8).contains(&dossiers.act_now.len()) {
            tracing::debug!(
                items = dossiers.act_now.len(),
                "Act-now list outside the requested 6-8 items"
            );
        }
        Ok(dossiers)
    }

    /// Themes, summary and insights over a subset of columns.
    ///
    /// `rows` are positional cell values; each index in `column_indices` is
    /// labeled from `column_names`, or with its spreadsheet letter when no
    /// name exists.
    pub async fn synthesize_column_summary(
        &self,
        rows: &[Vec<String>],
        column_indices: &[usize],
        column_names: &[String],
    ) -> Result<ColumnSummary> {
        if rows.is_empty() {
            return Ok(ColumnSummary::no_data());
        }

        let data = render_columns(rows, column_indices, column_names);
        self.request(
            "column summary",
            format!("Summarize the following spreadsheet rows:\n\n{data}"),
            &self.settings.column_instruction,
            schema::column_summary(),
        )
        .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        view: &'static str,
        prompt: String,
        system_instruction: &str,
        schema: serde_json::Value,
    ) -> Result<T> {
        let request = GenerationRequest {
            model: self.settings.model.clone(),
            prompt,
            system_instruction: system_instruction.to_string(),
            schema,
        };

        let outcome = async {
            let raw = llm::with_timeout(
                "synthesis",
                self.settings.timeout,
                self.backend.generate(&request),
            )
            .await?;
            llm::decode::<T>(&raw)
        }
        .await;

        outcome.map_err(|source| {
            tracing::warn!(view, error = %source, "Synthesis failed");
            Error::Synthesis {
                view,
                source: Box::new(source),
            }
        })
    }
}

/// Render the selected columns of every row as labeled text blocks
pub fn render_columns(
    rows: &[Vec<String>],
    column_indices: &[usize],
    column_names: &[String],
) -> String {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let mut block = format!("Row {}:", i + 1);
            for &index in column_indices {
                let name = column_names
                    .get(index)
                    .map(|n| n.trim())
                    .filter(|n| !n.is_empty())
                    .map(ToString::to_string)
                    .unwrap_or_else(|| format!("Column {}", column_letter(index)));
                let value = row.get(index).map(String::as_str).unwrap_or_default();
                block.push_str(&format!("\n{name}: {value}"));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Spreadsheet-style column letter: 0 → A, 25 → Z, 26 → AA
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}
