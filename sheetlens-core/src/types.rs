//! Core domain types for sheetlens
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Record** | One spreadsheet row as an ordered label → value mapping |
//! | **AnalysisResult** | Structured output of analyzing one Record |
//! | **MetricSet** | The numeric fields extracted per record |
//! | **Derived view** | A whole-collection synthesis (meta-analysis, dossiers, column summary) |
//! | **Session** | One sync from fetch through aggregation |
//!
//! Derived views are never persisted as authoritative data; they are pure
//! functions of the report collection and are recomputed from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Record
// ============================================

/// One spreadsheet row. Keys are the table's column labels in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Build a record from label/value pairs. A repeated label keeps its
    /// first value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut fields: Vec<(String, String)> = Vec::new();
        for (label, value) in pairs {
            let label = label.into();
            if fields.iter().any(|(existing, _)| *existing == label) {
                continue;
            }
            fields.push((label, value.into()));
        }
        Self { fields }
    }

    /// Exact (case-sensitive) lookup
    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    /// Case-insensitive lookup, first matching column wins
    pub fn get_ignore_case(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| l.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(l, _)| l.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ============================================
// Category
// ============================================

/// Kind of business record being analyzed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[default]
    #[serde(rename = "Sales Call")]
    SalesCall,
    #[serde(rename = "Customer Feedback")]
    CustomerFeedback,
    #[serde(rename = "Process Audit")]
    ProcessAudit,
}

impl Category {
    /// All categories in declaration order; the first is the fallback.
    pub const ALL: [Category; 3] = [
        Category::SalesCall,
        Category::CustomerFeedback,
        Category::ProcessAudit,
    ];

    /// Returns the label used in sheets and prompts
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SalesCall => "Sales Call",
            Category::CustomerFeedback => "Customer Feedback",
            Category::ProcessAudit => "Process Audit",
        }
    }

    /// Case-sensitive match against the sheet label
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == label)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Analysis results
// ============================================

/// Numeric signals extracted from one record.
///
/// The three percentages are always present; a model response without them
/// is rejected during decoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSet {
    /// 0–100
    pub conversion_probability: f64,
    /// 0–100
    pub customer_sentiment: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_size_estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_time_minutes: Option<f64>,
    /// 0–100
    pub churn_risk: f64,
}

impl MetricSet {
    /// Clamp percentages into `[0, 100]` and estimates to `>= 0`.
    ///
    /// Returns `None` if any value is not a finite number.
    pub fn normalized(self) -> Option<Self> {
        let pct = |v: f64| v.is_finite().then(|| v.clamp(0.0, 100.0));
        let non_negative = |v: Option<f64>| match v {
            Some(v) if !v.is_finite() => None,
            Some(v) => Some(Some(v.max(0.0))),
            None => Some(None),
        };

        Some(Self {
            conversion_probability: pct(self.conversion_probability)?,
            customer_sentiment: pct(self.customer_sentiment)?,
            deal_size_estimate: non_negative(self.deal_size_estimate)?,
            resolution_time_minutes: non_negative(self.resolution_time_minutes)?,
            churn_risk: pct(self.churn_risk)?,
        })
    }
}

/// Structured output of analyzing one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Opaque unique token
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: Category,
    /// Human-readable identifier (file name, date, ...)
    pub label: String,
    pub summary: String,
    pub insights: Vec<String>,
    pub metrics: MetricSet,
    pub raw_text: String,
}

// ============================================
// Session configuration
// ============================================

/// User-editable sync state, persisted in the configuration store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub source_id: String,
    pub sheet_name: String,
    #[serde(default)]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub analysis_prompt: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_id: String::new(),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            last_sync_time: None,
            connected: false,
            analysis_prompt: None,
        }
    }
}

/// Sheet name used when none is given
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

impl SyncConfig {
    /// Whether a sync may run against this configuration
    pub fn is_ready(&self) -> bool {
        self.connected && !self.source_id.trim().is_empty()
    }

    /// The analysis prompt, ignoring blank values
    pub fn prompt(&self) -> Option<&str> {
        self.analysis_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

// ============================================
// Derived views
// ============================================

/// One requested feature or recurring pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureCard {
    pub title: String,
    pub description: String,
    /// 0–100
    pub impact_score: f64,
}

/// Narrative meta-analysis across all results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaAnalysis {
    pub top_features: Vec<FeatureCard>,
    pub executive_narrative: String,
}

impl MetaAnalysis {
    /// Returned for an empty report collection
    pub fn no_data() -> Self {
        Self {
            top_features: Vec::new(),
            executive_narrative: "No data.".to_string(),
        }
    }
}

/// SWOT-style strategic dossiers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategicDossiers {
    /// Why customers say yes or no
    pub yes_no: String,
    /// Opportunities and threats
    pub opps_threats: String,
    /// Actionable items (6–8 requested)
    pub act_now: Vec<String>,
}

/// Thematic summary of a user-chosen column subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSummary {
    pub key_themes: Vec<String>,
    pub summary: String,
    pub insights: Vec<String>,
}

impl ColumnSummary {
    /// Returned when there are no rows to summarize
    pub fn no_data() -> Self {
        Self {
            key_themes: Vec::new(),
            summary: "No data available.".to_string(),
            insights: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_first_duplicate() {
        let record = Record::from_pairs([("Notes", "first"), ("Notes", "second"), ("Type", "x")]);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("Notes"), Some("first"));
        assert_eq!(record.labels().collect::<Vec<_>>(), vec!["Notes", "Type"]);
    }

    #[test]
    fn test_category_match_is_case_sensitive() {
        assert_eq!(Category::from_label("Process Audit"), Some(Category::ProcessAudit));
        assert_eq!(Category::from_label("process audit"), None);
        assert_eq!(Category::default(), Category::SalesCall);
    }

    #[test]
    fn test_category_serde_uses_labels() {
        let json = serde_json::to_string(&Category::CustomerFeedback).unwrap();
        assert_eq!(json, "\"Customer Feedback\"");
    }

    #[test]
    fn test_metrics_normalized_clamps() {
        let metrics = MetricSet {
            conversion_probability: 140.0,
            customer_sentiment: -3.0,
            deal_size_estimate: Some(-10.0),
            resolution_time_minutes: None,
            churn_risk: 12.5,
        }
        .normalized()
        .unwrap();
        assert_eq!(metrics.conversion_probability, 100.0);
        assert_eq!(metrics.customer_sentiment, 0.0);
        assert_eq!(metrics.deal_size_estimate, Some(0.0));
        assert_eq!(metrics.churn_risk, 12.5);
    }

    #[test]
    fn test_metrics_reject_non_finite() {
        let metrics = MetricSet {
            conversion_probability: f64::NAN,
            customer_sentiment: 50.0,
            deal_size_estimate: None,
            resolution_time_minutes: None,
            churn_risk: 10.0,
        };
        assert!(metrics.normalized().is_none());
    }

    #[test]
    fn test_sync_config_readiness() {
        let mut config = SyncConfig::default();
        assert_eq!(config.sheet_name, "Sheet1");
        assert!(!config.is_ready());
        config.source_id = "abc".into();
        config.connected = true;
        assert!(config.is_ready());
        config.analysis_prompt = Some("   ".into());
        assert_eq!(config.prompt(), None);
    }
}
