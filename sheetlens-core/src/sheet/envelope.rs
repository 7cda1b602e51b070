//! Callback-envelope unwrapping and table decoding

use super::{Cell, Column, RawTable};
use crate::error::{Error, RemoteErrorKind, Result};
use serde::Deserialize;

const ANTI_XSSI_PREFIX: &str = "/*O_o*/";
const ENVELOPE_PREFIX: &str = "google.visualization.Query.setResponse(";

// ============================================
// Raw response types (serde deserialization)
// ============================================

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<QueryMessage>,
    #[serde(default)]
    table: Option<QueryTable>,
}

#[derive(Debug, Deserialize)]
struct QueryMessage {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detailed_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryTable {
    #[serde(default)]
    cols: Vec<QueryColumn>,
    #[serde(default)]
    rows: Vec<QueryRow>,
}

#[derive(Debug, Deserialize)]
struct QueryColumn {
    #[serde(default)]
    id: String,
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    #[serde(default)]
    c: Vec<Option<QueryCell>>,
}

#[derive(Debug, Deserialize)]
struct QueryCell {
    #[serde(default)]
    v: serde_json::Value,
    #[serde(default)]
    f: Option<String>,
}

/// Locate the JSON object embedded in the callback envelope.
///
/// The exact `setResponse(...);` envelope is tried first; otherwise the text
/// between the first `({` and the last `})` is used.
pub fn unwrap_envelope(body: &str) -> Result<&str> {
    if let Some(inner) = strict_unwrap(body) {
        return Ok(inner);
    }

    let start = body.find("({");
    let end = body.rfind("})");
    match (start, end) {
        (Some(start), Some(end)) if end > start => {
            let inner = body[start + 1..=end].trim();
            if inner.is_empty() {
                return Err(Error::MalformedEnvelope(
                    "embedded object is empty".to_string(),
                ));
            }
            tracing::debug!("Envelope located by delimiter fallback");
            Ok(inner)
        }
        _ => Err(Error::MalformedEnvelope(format!(
            "no callback envelope found in response starting with {:?}",
            preview(body)
        ))),
    }
}

fn strict_unwrap(body: &str) -> Option<&str> {
    let text = body.trim();
    let text = text.strip_prefix(ANTI_XSSI_PREFIX).unwrap_or(text).trim_start();
    let text = text.strip_prefix(ENVELOPE_PREFIX)?;
    let text = text.trim_end();
    let text = text.strip_suffix(';').unwrap_or(text).trim_end();
    let inner = text.strip_suffix(')')?.trim();
    (inner.starts_with('{') && inner.ends_with('}')).then_some(inner)
}

/// Decode an endpoint response into a [`RawTable`].
///
/// Fails with:
/// - `MalformedEnvelope` if no embedded object can be located
/// - `MalformedPayload` if the embedded text is not valid JSON
/// - `RemoteError` if the endpoint reported an error instead of a table
/// - `EmptyResult` if the table has no data rows
pub fn parse_response(body: &str) -> Result<RawTable> {
    let inner = unwrap_envelope(body)?;

    let response: QueryResponse =
        serde_json::from_str(inner).map_err(|e| Error::MalformedPayload {
            message: format!("embedded JSON does not decode: {e}"),
            hint: "a cell likely contains an unescaped quote, backslash or control character"
                .to_string(),
        })?;

    let reported_error = response.status.as_deref() == Some("error");
    if reported_error || (response.table.is_none() && !response.errors.is_empty()) {
        let message = remote_message(&response.errors);
        let kind = classify_remote_error(&message);
        tracing::warn!(%message, ?kind, "Sheet endpoint returned an error");
        return Err(Error::RemoteError { message, kind });
    }

    let table = response.table.ok_or_else(|| Error::MalformedPayload {
        message: "response contains neither a table nor an error".to_string(),
        hint: "the endpoint format may have changed".to_string(),
    })?;

    if table.rows.is_empty() {
        return Err(Error::EmptyResult);
    }

    let columns: Vec<Column> = table
        .cols
        .into_iter()
        .map(|c| Column {
            id: c.id,
            label: c.label,
        })
        .collect();

    let width = columns.len();
    let rows = table
        .rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let mut cells: Vec<Option<Cell>> = row
                .c
                .into_iter()
                .map(|cell| {
                    cell.map(|c| Cell {
                        value: c.v,
                        formatted: c.f,
                    })
                })
                .collect();
            if cells.len() > width {
                tracing::debug!(
                    row = index,
                    cells = cells.len(),
                    columns = width,
                    "Dropping cells beyond the last column"
                );
                cells.truncate(width);
            }
            cells
        })
        .collect();

    Ok(RawTable { columns, rows })
}

fn remote_message(errors: &[QueryMessage]) -> String {
    let parts: Vec<String> = errors
        .iter()
        .filter_map(|e| {
            e.detailed_message
                .clone()
                .or_else(|| e.message.clone())
                .or_else(|| e.reason.clone())
        })
        .collect();
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join("; ")
    }
}

fn classify_remote_error(message: &str) -> RemoteErrorKind {
    let lower = message.to_lowercase();
    if ["access", "permission", "denied", "unauthorized", "sign in"]
        .iter()
        .any(|k| lower.contains(k))
    {
        RemoteErrorKind::AccessDenied
    } else if ["sheet", "tab", "worksheet"].iter().any(|k| lower.contains(k)) {
        RemoteErrorKind::SheetNotFound
    } else {
        RemoteErrorKind::Other
    }
}

fn preview(body: &str) -> String {
    body.trim().chars().take(60).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRICT: &str = "/*O_o*/\ngoogle.visualization.Query.setResponse({\"version\":\"0.6\",\"status\":\"ok\",\"table\":{\"cols\":[{\"id\":\"A\",\"label\":\"Transcript\",\"type\":\"string\"},{\"id\":\"B\",\"label\":\"Type\",\"type\":\"string\"}],\"rows\":[{\"c\":[{\"v\":\"Great demo\"},{\"v\":\"Sales Call\"}]}]}});";

    #[test]
    fn test_strict_envelope() {
        let inner = unwrap_envelope(STRICT).unwrap();
        assert!(inner.starts_with("{\"version\""));
        assert!(inner.ends_with("}}"));
    }

    #[test]
    fn test_fallback_envelope() {
        let body = "callback_7({\"table\":{\"cols\":[],\"rows\":[]}})\n";
        let inner = unwrap_envelope(body).unwrap();
        assert_eq!(inner, "{\"table\":{\"cols\":[],\"rows\":[]}}");
    }

    #[test]
    fn test_missing_delimiters_is_malformed_envelope() {
        for body in ["<html>Sign in</html>", "", "({", "})({"] {
            assert!(
                matches!(unwrap_envelope(body), Err(Error::MalformedEnvelope(_))),
                "body {body:?} should not unwrap"
            );
        }
    }

    #[test]
    fn test_parse_response_decodes_table() {
        let table = parse_response(STRICT).unwrap();
        assert_eq!(table.headers(), vec!["Transcript", "Type"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.text_rows()[0], vec!["Great demo", "Sales Call"]);
    }

    #[test]
    fn test_header_only_is_empty_result() {
        let body = "google.visualization.Query.setResponse({\"table\":{\"cols\":[{\"label\":\"Transcript\"}],\"rows\":[]}});";
        assert!(matches!(parse_response(body), Err(Error::EmptyResult)));
    }

    #[test]
    fn test_broken_json_is_malformed_payload() {
        let body = "google.visualization.Query.setResponse({\"table\":{\"cols\":[{\"label\":\"Notes\"}],\"rows\":[{\"c\":[{\"v\":\"said \"hi\"\"}]}]}});";
        match parse_response(body) {
            Err(Error::MalformedPayload { hint, .. }) => assert!(hint.contains("unescaped")),
            other => panic!("expected MalformedPayload, got {other:?}"),
        }
    }

    #[test]
    fn test_remote_error_sheet_not_found() {
        let body = "google.visualization.Query.setResponse({\"version\":\"0.6\",\"status\":\"error\",\"errors\":[{\"reason\":\"invalid_query\",\"message\":\"INVALID_QUERY\",\"detailed_message\":\"Invalid sheet name: Leads\"}]});";
        match parse_response(body) {
            Err(Error::RemoteError { message, kind }) => {
                assert_eq!(message, "Invalid sheet name: Leads");
                assert_eq!(kind, RemoteErrorKind::SheetNotFound);
            }
            other => panic!("expected RemoteError, got {other:?}"),
        }
    }

    #[test]
    fn test_remote_error_access_denied() {
        assert_eq!(
            classify_remote_error("Access denied for this spreadsheet"),
            RemoteErrorKind::AccessDenied
        );
        assert_eq!(classify_remote_error("backend busy"), RemoteErrorKind::Other);
    }

    #[test]
    fn test_extra_cells_are_dropped() {
        let body = "google.visualization.Query.setResponse({\"table\":{\"cols\":[{\"label\":\"A\"}],\"rows\":[{\"c\":[{\"v\":\"1\"},{\"v\":\"2\"}]}]}});";
        let table = parse_response(body).unwrap();
        assert_eq!(table.rows[0].len(), 1);
    }
}
