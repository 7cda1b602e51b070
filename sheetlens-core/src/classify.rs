//! Record classification
//!
//! Sheets come with whatever headers their owners chose, so each logical
//! field (content, category, display label) is resolved by probing an ordered
//! alias list. The alias table is plain data ([`AliasTable`]) and can be
//! overridden from `[classifier]` in the config file.
//!
//! Resolution for one field:
//! 1. Each alias is tried as an exact header match, in order; the first
//!    non-empty value wins.
//! 2. If nothing matched, the aliases are retried case-insensitively.

use crate::config::ClassifierConfig;
use crate::types::{Category, Record};

/// Label used when no display-label alias resolves
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Ordered header aliases per logical field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasTable {
    pub content: Vec<String>,
    pub category: Vec<String>,
    pub label: Vec<String>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::from(&ClassifierConfig::default())
    }
}

impl From<&ClassifierConfig> for AliasTable {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            content: config.content.clone(),
            category: config.category.clone(),
            label: config.label.clone(),
        }
    }
}

/// A record that qualifies for analysis
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisTarget {
    /// Position of the record in the sheet
    pub row: usize,
    pub category: Category,
    pub label: String,
    pub content: String,
}

/// Outcome of classifying a batch of records
#[derive(Debug, Default)]
pub struct Selection {
    pub targets: Vec<AnalysisTarget>,
    /// Row indices excluded because their content was empty
    pub skipped: Vec<usize>,
}

/// Resolves content, category and label for records
#[derive(Debug, Clone, Default)]
pub struct RecordClassifier {
    aliases: AliasTable,
}

impl RecordClassifier {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Classify one record. Returns `None` when the resolved content is
    /// empty or whitespace, which excludes it from analysis.
    pub fn classify(&self, row: usize, record: &Record) -> Option<AnalysisTarget> {
        let content = resolve(record, &self.aliases.content)?.trim();
        if content.is_empty() {
            return None;
        }

        let category = resolve(record, &self.aliases.category)
            .and_then(|value| Category::from_label(value.trim()))
            .unwrap_or_default();

        let label = resolve(record, &self.aliases.label)
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());

        Some(AnalysisTarget {
            row,
            category,
            label,
            content: content.to_string(),
        })
    }

    /// Classify records in order, separating analysis targets from skipped rows
    pub fn select(&self, records: &[Record]) -> Selection {
        let mut selection = Selection::default();
        for (row, record) in records.iter().enumerate() {
            match self.classify(row, record) {
                Some(target) => selection.targets.push(target),
                None => {
                    tracing::debug!(row, "Skipping record with empty content");
                    selection.skipped.push(row);
                }
            }
        }
        selection
    }
}

/// First non-empty value among `aliases`, exact matches before case-insensitive ones
fn resolve<'r>(record: &'r Record, aliases: &[String]) -> Option<&'r str> {
    let non_empty = |v: &&str| !v.trim().is_empty();
    aliases
        .iter()
        .find_map(|alias| record.get(alias).filter(non_empty))
        .or_else(|| {
            aliases
                .iter()
                .find_map(|alias| record.get_ignore_case(alias).filter(non_empty))
        })
}
