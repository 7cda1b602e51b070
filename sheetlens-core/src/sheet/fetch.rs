//! HTTP retrieval of the raw export text

use std::time::Duration;

use async_trait::async_trait;

use crate::config::SheetConfig;
use crate::error::{Error, Result};

/// Retrieves the raw export body for a sheet. No parsing happens here.
#[async_trait]
pub trait SheetFetcher: Send + Sync {
    async fn fetch(&self, source_id: &str, sheet_name: &str) -> Result<String>;
}

/// Build the JSON export URL for a spreadsheet tab
pub fn export_url(base_url: &str, source_id: &str, sheet_name: &str) -> String {
    format!(
        "{}/spreadsheets/d/{}/gviz/tq?tqx=out:json&sheet={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(source_id),
        urlencoding::encode(sheet_name)
    )
}

/// Accept either a bare spreadsheet ID or a full sheet URL.
///
/// `https://docs.google.com/spreadsheets/d/<id>/edit#gid=0` yields `<id>`.
pub fn normalize_source_id(input: &str) -> String {
    let input = input.trim();
    match input.split_once("/d/") {
        Some((_, rest)) => rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
        None => input.to_string(),
    }
}

/// Fetches sheet exports over HTTP
pub struct HttpSheetFetcher {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSheetFetcher {
    pub fn new(config: &SheetConfig) -> Result<Self> {
        let timeout = config.timeout();
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.clone(),
            timeout,
        })
    }

    async fn get(&self, url: &str) -> Result<String> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::from_reqwest("sheet fetch", self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let reason = match status.as_u16() {
                401 | 403 => "the spreadsheet is not shared publicly",
                404 => "the spreadsheet ID does not exist",
                _ => "unexpected response",
            };
            return Err(Error::Transport(format!(
                "sheet endpoint returned {}: {}",
                status, reason
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::from_reqwest("sheet fetch", self.timeout, e))
    }
}

#[async_trait]
impl SheetFetcher for HttpSheetFetcher {
    async fn fetch(&self, source_id: &str, sheet_name: &str) -> Result<String> {
        let url = export_url(&self.base_url, source_id, sheet_name);
        tracing::debug!(%url, "Fetching sheet export");

        let body = tokio::time::timeout(self.timeout, self.get(&url))
            .await
            .map_err(|_| Error::Timeout {
                operation: "sheet fetch",
                after: self.timeout,
            })??;

        tracing::info!(bytes = body.len(), sheet = %sheet_name, "Fetched sheet export");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_url_encodes_sheet_name() {
        let url = export_url("https://docs.google.com/", "abc123", "Q3 Calls");
        assert_eq!(
            url,
            "https://docs.google.com/spreadsheets/d/abc123/gviz/tq?tqx=out:json&sheet=Q3%20Calls"
        );
    }

    #[test]
    fn test_normalize_source_id() {
        assert_eq!(normalize_source_id("  abc123 "), "abc123");
        assert_eq!(
            normalize_source_id("https://docs.google.com/spreadsheets/d/1LLAS-yz_9/edit#gid=0"),
            "1LLAS-yz_9"
        );
        assert_eq!(
            normalize_source_id("https://docs.google.com/spreadsheets/d/xyz?usp=sharing"),
            "xyz"
        );
    }

    #[test]
    fn test_fetcher_builds_from_default_config() {
        assert!(HttpSheetFetcher::new(&SheetConfig::default()).is_ok());
    }
}
