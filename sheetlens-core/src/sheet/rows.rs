//! Table → record mapping

use super::RawTable;
use crate::types::Record;

/// Zip each row's cells with the column headers.
///
/// Total and order-preserving: row `i` becomes record `i`. Missing trailing
/// cells map to the empty string, and a repeated header keeps the value of
/// its first column.
pub fn map_rows(table: &RawTable) -> Vec<Record> {
    let headers = table.headers();
    table
        .text_rows()
        .into_iter()
        .map(|cells| Record::from_pairs(headers.iter().cloned().zip(cells)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::{Cell, Column};
    use serde_json::json;

    fn column(label: &str) -> Column {
        Column {
            id: String::new(),
            label: label.to_string(),
        }
    }

    fn cell(v: &str) -> Option<Cell> {
        Some(Cell {
            value: json!(v),
            formatted: None,
        })
    }

    #[test]
    fn test_rows_map_in_order() {
        let table = RawTable {
            columns: vec![column("Transcript"), column("Type")],
            rows: (0..20)
                .map(|i| vec![cell(&format!("row {i}")), cell("Sales Call")])
                .collect(),
        };
        let records = map_rows(&table);
        assert_eq!(records.len(), 20);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.get("Transcript"), Some(format!("row {i}").as_str()));
        }
    }

    #[test]
    fn test_missing_cells_are_empty() {
        let table = RawTable {
            columns: vec![column("Transcript"), column("Type"), column("File")],
            rows: vec![vec![cell("hello")], vec![None, cell("Process Audit")]],
        };
        let records = map_rows(&table);
        assert_eq!(records[0].get("Type"), Some(""));
        assert_eq!(records[0].get("File"), Some(""));
        assert_eq!(records[1].get("Transcript"), Some(""));
        assert_eq!(records[1].get("Type"), Some("Process Audit"));
    }

    #[test]
    fn test_duplicate_headers_keep_first_column() {
        let table = RawTable {
            columns: vec![column("Notes"), column("Notes")],
            rows: vec![vec![cell("first"), cell("second")]],
        };
        let records = map_rows(&table);
        assert_eq!(records[0].len(), 1);
        assert_eq!(records[0].get("Notes"), Some("first"));
    }
}
