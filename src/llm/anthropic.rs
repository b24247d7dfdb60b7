//! Anthropic Claude client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::LlmProvider;
use crate::{Error, Result};

/// Anthropic Claude LLM client (blocking).
pub struct AnthropicClient {
    /// API key.
    api_key: Option<String>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.anthropic.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "claude-3-haiku-20240307";

    /// Request timeout.
    const TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a client from the `ANTHROPIC_API_KEY` environment variable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            client: reqwest::blocking::Client::builder()
                .timeout(Self::TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Whether a plausibly-valid API key is configured.
    ///
    /// Anthropic keys carry an `sk-ant-` prefix; obviously malformed keys
    /// are rejected before any network request is made.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| key.starts_with("sk-ant-") && key.len() >= 40)
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmProvider for AnthropicClient {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let key = self.api_key.as_ref().filter(|_| self.is_configured()).ok_or_else(|| {
            Error::External {
                operation: "anthropic_complete".to_string(),
                cause: "ANTHROPIC_API_KEY not set or malformed".to_string(),
            }
        })?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: 1500,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .map_err(|e| Error::External {
                operation: "anthropic_complete".to_string(),
                cause: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::External {
                operation: "anthropic_complete".to_string(),
                cause: format!("API returned status {}", response.status()),
            });
        }

        let body: MessagesResponse = response.json().map_err(|e| Error::External {
            operation: "anthropic_complete".to_string(),
            cause: e.to_string(),
        })?;

        Ok(body
            .content
            .first()
            .map(|block| block.text.trim().to_string())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_client_errors_without_network() {
        let client = AnthropicClient::new().with_api_key("not-a-real-key");
        assert!(!client.is_configured());
        let err = client.complete("hello").unwrap_err();
        assert!(matches!(err, Error::External { .. }));
    }

    #[test]
    fn test_key_format_check() {
        let client = AnthropicClient::new().with_api_key("sk-ant-api03-".to_owned() + &"a".repeat(40));
        assert!(client.is_configured());

        let client = AnthropicClient::new().with_api_key("sk-ant-x");
        assert!(!client.is_configured());
    }

    #[test]
    fn test_builder_chain() {
        let client = AnthropicClient::new()
            .with_endpoint("http://localhost:9000/v1")
            .with_model("claude-3-5-haiku-latest");
        assert_eq!(client.endpoint, "http://localhost:9000/v1");
        assert_eq!(client.model, "claude-3-5-haiku-latest");
    }
}
