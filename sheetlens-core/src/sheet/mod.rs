//! Spreadsheet ingestion
//!
//! Turns the spreadsheet export endpoint's response into ordered records.
//!
//! ```text
//! SheetFetcher ──text──► parse_response ──RawTable──► map_rows ──► Vec<Record>
//! ```
//!
//! The endpoint wraps a JSON object in a JavaScript callback
//! (`google.visualization.Query.setResponse({...});`). Its shape is not a
//! documented contract, so unwrapping is defensive and every failure maps to a
//! distinct [`crate::Error`] variant.

mod envelope;
mod fetch;
mod rows;

pub use envelope::{parse_response, unwrap_envelope};
pub use fetch::{export_url, normalize_source_id, HttpSheetFetcher, SheetFetcher};
pub use rows::map_rows;

/// A column of the decoded table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub id: String,
    pub label: String,
}

impl Column {
    /// The header used as the record key: the label, or the column id when
    /// the label is blank.
    pub fn header(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// A single cell value as emitted by the endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: serde_json::Value,
    /// Display-formatted value, when the endpoint provides one
    pub formatted: Option<String>,
}

impl Cell {
    /// Plain-text rendering of the raw value. Null renders as empty.
    pub fn text(&self) -> String {
        match &self.value {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
                Some(f) => format!("{}", f),
                None => n.to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// Decoded table: ordered columns plus rows of optional cells.
///
/// Each row has at most `columns.len()` cells; absent trailing cells read as
/// empty strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Option<Cell>>>,
}

impl RawTable {
    /// Column headers in order
    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.header().to_string()).collect()
    }

    /// Every row as plain text, padded to the column count
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                (0..self.columns.len())
                    .map(|i| {
                        row.get(i)
                            .and_then(|c| c.as_ref())
                            .map(Cell::text)
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect()
    }
}
