//! Model backend abstraction
//!
//! The pipeline talks to a text-generation backend through [`ModelBackend`]:
//! one structured-generation call per request, returning text that should
//! parse as JSON matching the requested schema. [`decode`] turns that text
//! into a fully-populated typed value or a [`Error::SchemaViolation`]; no
//! partially-populated value ever reaches the rest of the pipeline.

mod http;
pub mod schema;

pub use http::HttpModelBackend;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// One structured-generation call
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub system_instruction: String,
    /// JSON schema the response must conform to
    pub schema: serde_json::Value,
}

/// Structured-generation interface used by analysis and aggregation.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Run one request and return the raw response text
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Run `call` with a caller-visible deadline.
pub async fn with_timeout<T>(
    operation: &'static str,
    after: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, call)
        .await
        .map_err(|_| Error::Timeout { operation, after })?
}

/// Strictly decode model output into `T`.
///
/// Accepts bare JSON or JSON wrapped in prose/code fences (the outermost
/// `{...}` span is retried). Missing or mistyped fields are a
/// `SchemaViolation`.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let value = match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(value) => value,
        Err(_) => {
            let extracted = extract_json_object(raw)?;
            serde_json::from_str::<serde_json::Value>(extracted)
                .map_err(|e| Error::SchemaViolation(format!("response is not JSON: {e}")))?
        }
    };

    if !value.is_object() {
        return Err(Error::SchemaViolation(
            "response must be a JSON object".to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|e| Error::SchemaViolation(e.to_string()))
}

fn extract_json_object(raw: &str) -> Result<&str> {
    let start = raw.find('{').ok_or_else(|| {
        Error::SchemaViolation("response did not contain a JSON object".to_string())
    })?;
    let end = raw.rfind('}').ok_or_else(|| {
        Error::SchemaViolation("response did not contain a JSON object".to_string())
    })?;
    if end <= start {
        return Err(Error::SchemaViolation(
            "response JSON bounds are invalid".to_string(),
        ));
    }
    Ok(&raw[start..=end])
}

/// Call-counting scripted backend shared by unit tests
#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Handler = Box<dyn Fn(&GenerationRequest) -> Result<String> + Send + Sync>;

    pub(crate) struct ScriptedBackend {
        handler: Handler,
        delay: Option<Duration>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedBackend {
        pub(crate) fn new(
            handler: impl Fn(&GenerationRequest) -> Result<String> + Send + Sync + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                delay: None,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        /// Always answers with `response`
        pub(crate) fn fixed(response: &str) -> Self {
            let response = response.to_string();
            Self::new(move |_| Ok(response.clone()))
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let response = (self.handler)(request);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StrategicDossiers;

    #[test]
    fn test_decode_plain_json() {
        let dossiers: StrategicDossiers =
            decode(r#"{"yesNo":"price","oppsThreats":"competitor","actNow":["call back"]}"#)
                .unwrap();
        assert_eq!(dossiers.act_now, vec!["call back"]);
    }

    #[test]
    fn test_decode_fenced_json() {
        let raw = "Here you go:\n```json\n{\"yesNo\":\"a\",\"oppsThreats\":\"b\",\"actNow\":[]}\n```";
        let dossiers: StrategicDossiers = decode(raw).unwrap();
        assert_eq!(dossiers.yes_no, "a");
    }

    #[test]
    fn test_decode_missing_field_is_schema_violation() {
        let result: Result<StrategicDossiers> = decode(r#"{"yesNo":"a"}"#);
        assert!(matches!(result, Err(Error::SchemaViolation(msg)) if msg.contains("oppsThreats")));
    }

    #[test]
    fn test_decode_non_object_is_schema_violation() {
        let result: Result<StrategicDossiers> = decode("[1, 2, 3]");
        assert!(matches!(result, Err(Error::SchemaViolation(_))));
        let result: Result<StrategicDossiers> = decode("no json here");
        assert!(matches!(result, Err(Error::SchemaViolation(_))));
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed() {
        let result: Result<()> = with_timeout("probe", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout { operation: "probe", .. })));
    }
}
