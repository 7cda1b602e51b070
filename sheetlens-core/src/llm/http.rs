//! HTTP-backed model providers

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;

use super::{GenerationRequest, ModelBackend};
use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};

const MAX_OUTPUT_TOKENS: u32 = 4096;

/// Model backend speaking the native HTTP API of the configured provider
pub struct HttpModelBackend {
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpModelBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string())
            .trim_end_matches('/')
            .to_string();

        let api_key = config.api_key.clone().or_else(|| {
            config
                .provider
                .api_key_vars()
                .iter()
                .find_map(|var| std::env::var(var).ok())
        });

        if config.provider != LlmProvider::Ollama && api_key.is_none() {
            return Err(Error::Config(format!(
                "llm.api_key (or one of {:?}) is required",
                config.provider.api_key_vars()
            )));
        }

        let timeout = config.timeout();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            provider: config.provider,
            endpoint,
            api_key,
            timeout,
            http,
        })
    }

    fn key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    async fn post(
        &self,
        provider: &'static str,
        url: String,
        headers: HeaderMap,
        body: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::from_reqwest("model request", self.timeout, e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::from_reqwest("model request", self.timeout, e))?;
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "{provider} returned {}: {}",
                status.as_u16(),
                text
            )));
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::Transport(format!("{provider} returned a non-JSON body: {e}")))
    }

    async fn gemini(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, request.model
        );
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(self.key())
                .map_err(|e| Error::Config(format!("invalid gemini api key header: {e}")))?,
        );

        let json = self
            .post(
                "gemini",
                url,
                headers,
                json!({
                    "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
                    "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
                    "generationConfig": {
                        "responseMimeType": "application/json",
                        "responseJsonSchema": request.schema,
                    },
                }),
            )
            .await?;

        json.pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::SchemaViolation(
                    "gemini response missing candidates[0].content.parts[0].text".to_string(),
                )
            })
    }

    async fn ollama(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.endpoint);
        let json = self
            .post(
                "ollama",
                url,
                HeaderMap::new(),
                json!({
                    "model": request.model,
                    "system": request.system_instruction,
                    "prompt": request.prompt,
                    "format": request.schema,
                    "stream": false,
                }),
            )
            .await?;

        json.get("response")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::SchemaViolation("ollama response missing string field `response`".to_string())
            })
    }

    async fn claude(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/v1/messages", self.endpoint);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(self.key())
                .map_err(|e| Error::Config(format!("invalid claude api key header: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

        let system = format!(
            "{}\n\nRespond with only a JSON object matching this schema:\n{}",
            request.system_instruction, request.schema
        );
        let json = self
            .post(
                "claude",
                url,
                headers,
                json!({
                    "model": request.model,
                    "max_tokens": MAX_OUTPUT_TOKENS,
                    "temperature": 0,
                    "system": system,
                    "messages": [{ "role": "user", "content": request.prompt }],
                }),
            )
            .await?;

        json.pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::SchemaViolation("claude response missing content[0].text".to_string())
            })
    }

    async fn openai(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.endpoint);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.key()))
                .map_err(|e| Error::Config(format!("invalid auth header: {e}")))?,
        );

        let json = self
            .post(
                "openai",
                url,
                headers,
                json!({
                    "model": request.model,
                    "temperature": 0,
                    "messages": [
                        { "role": "system", "content": request.system_instruction },
                        { "role": "user", "content": request.prompt }
                    ],
                    "response_format": {
                        "type": "json_schema",
                        "json_schema": { "name": "result", "schema": request.schema }
                    }
                }),
            )
            .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::SchemaViolation(
                    "openai response missing choices[0].message.content".to_string(),
                )
            })
    }
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        tracing::debug!(
            provider = ?self.provider,
            model = %request.model,
            prompt_chars = request.prompt.len(),
            "Sending generation request"
        );
        match self.provider {
            LlmProvider::Gemini => self.gemini(request).await,
            LlmProvider::Ollama => self.ollama(request).await,
            LlmProvider::Claude => self.claude(request).await,
            LlmProvider::OpenAI => self.openai(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            provider,
            model: "test-model".to_string(),
            synthesis_model: None,
            endpoint: Some("http://localhost:9/".to_string()),
            api_key: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let backend = HttpModelBackend::new(&config(LlmProvider::Ollama)).unwrap();
        assert_eq!(backend.endpoint, "http://localhost:9");
    }

    #[test]
    fn test_explicit_key_is_used() {
        let mut cfg = config(LlmProvider::Claude);
        cfg.api_key = Some("sk-test".to_string());
        let backend = HttpModelBackend::new(&cfg).unwrap();
        assert_eq!(backend.key(), "sk-test");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let backend = HttpModelBackend::new(&config(LlmProvider::Ollama)).unwrap();
        let request = GenerationRequest {
            model: "m".into(),
            prompt: "p".into(),
            system_instruction: "s".into(),
            schema: json!({}),
        };
        let err = backend.generate(&request).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_) | Error::Timeout { .. }));
    }
}
