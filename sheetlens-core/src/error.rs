//! Error types for sheetlens-core

use std::time::Duration;
use thiserror::Error;

/// What an upstream-reported sheet error most likely means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The requested tab does not exist in the spreadsheet
    SheetNotFound,
    /// The spreadsheet is private or the identifier is wrong
    AccessDenied,
    /// Anything else the endpoint reported
    Other,
}

/// Main error type for the sheetlens-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Network/HTTP failure reaching the sheet endpoint or the model backend
    #[error("transport error: {0}")]
    Transport(String),

    /// The callback envelope around the sheet payload could not be located
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The envelope was found but the embedded object does not decode
    #[error("malformed payload: {message} ({hint})")]
    MalformedPayload { message: String, hint: String },

    /// The sheet endpoint answered with a structured error instead of a table
    #[error("sheet endpoint reported an error: {message}")]
    RemoteError {
        message: String,
        kind: RemoteErrorKind,
    },

    /// The table has a header row but no data rows
    #[error("sheet contains no data rows")]
    EmptyResult,

    /// A single record could not be analyzed
    #[error("analysis of record '{record}' failed: {source}")]
    RecordAnalysis {
        record: String,
        #[source]
        source: Box<Error>,
    },

    /// Model output is missing required fields or is not the requested shape
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// An aggregation call failed
    #[error("{view} synthesis failed: {source}")]
    Synthesis {
        view: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// An external call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The session was cancelled before the operation started
    #[error("operation cancelled")]
    Cancelled,

    /// No spreadsheet has been connected yet
    #[error("no spreadsheet connected")]
    NotConnected,

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns an actionable hint for errors a user can fix.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Error::Transport(_) => Some(
                "could not reach the endpoint; check the spreadsheet ID and your network connection",
            ),
            Error::MalformedEnvelope(_) => Some(
                "the sheet did not return data; make sure it is shared as 'anyone with the link can view'",
            ),
            Error::MalformedPayload { .. } => Some(
                "cell content probably contains characters the export did not escape; clean up quotes or line breaks in the sheet",
            ),
            Error::RemoteError { kind, .. } => Some(match kind {
                RemoteErrorKind::SheetNotFound => {
                    "the tab name was not found; check the sheet name (it is case-sensitive)"
                }
                RemoteErrorKind::AccessDenied => {
                    "access was denied; check the spreadsheet ID and its sharing permissions"
                }
                RemoteErrorKind::Other => "the spreadsheet service rejected the query",
            }),
            Error::EmptyResult => Some("the sheet only has a header row; add data rows and sync again"),
            Error::NotConnected => Some("run sheetlens-connect <spreadsheet-id> first"),
            Error::Timeout { .. } => Some("the upstream service is slow; try again or raise timeout_secs"),
            _ => None,
        }
    }

    /// Whether this error ends a sync session outright (fetch/parse failures).
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::MalformedEnvelope(_)
                | Error::MalformedPayload { .. }
                | Error::RemoteError { .. }
                | Error::EmptyResult
                | Error::Timeout { .. }
                | Error::NotConnected
                | Error::Cancelled
        )
    }

    /// Maps a reqwest failure onto the transport/timeout split.
    pub(crate) fn from_reqwest(
        operation: &'static str,
        timeout: Duration,
        err: reqwest::Error,
    ) -> Self {
        if err.is_timeout() {
            Error::Timeout {
                operation,
                after: timeout,
            }
        } else {
            Error::Transport(format!("{operation} failed: {err}"))
        }
    }
}

/// Result type alias for sheetlens-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::EmptyResult.is_session_fatal());
        assert!(Error::MalformedEnvelope("x".into()).is_session_fatal());
        assert!(!Error::SchemaViolation("missing churnRisk".into()).is_session_fatal());
        assert!(!Error::Synthesis {
            view: "meta",
            source: Box::new(Error::Transport("down".into())),
        }
        .is_session_fatal());
    }

    #[test]
    fn test_remote_error_hints_differ() {
        let missing = Error::RemoteError {
            message: "Invalid sheet".into(),
            kind: RemoteErrorKind::SheetNotFound,
        };
        let denied = Error::RemoteError {
            message: "Access denied".into(),
            kind: RemoteErrorKind::AccessDenied,
        };
        assert_ne!(missing.remediation(), denied.remediation());
        assert!(missing.remediation().unwrap().contains("sheet name"));
    }

    #[test]
    fn test_record_error_display_names_record() {
        let err = Error::RecordAnalysis {
            record: "call-17.txt".into(),
            source: Box::new(Error::SchemaViolation("missing field `churnRisk`".into())),
        };
        let text = err.to_string();
        assert!(text.contains("call-17.txt"));
        assert!(text.contains("churnRisk"));
    }
}
