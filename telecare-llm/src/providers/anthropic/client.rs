//! Anthropic HTTP client with outbound pacing

use super::types::ApiError;
use crate::providers::{invalid_response, outbound_pacer, request_failed, status_error};
use governor::DefaultDirectRateLimiter;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use telecare_core::LlmError;

const API_VERSION: &str = "2023-06-01";

/// Anthropic API client.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    pacer: DefaultDirectRateLimiter,
}

impl AnthropicClient {
    pub const PROVIDER: &'static str = "anthropic";

    /// Create a new Anthropic client.
    ///
    /// # Arguments
    /// * `api_key` - Anthropic API key
    /// * `requests_per_minute` - Outbound pacing quota (default: 50)
    pub fn new(api_key: impl Into<String>, requests_per_minute: u32) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            pacer: outbound_pacer(requests_per_minute),
        }
    }

    /// Point the client at a different endpoint (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post<Req: Serialize + ?Sized, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> Result<Res, LlmError> {
        self.pacer.until_ready().await;

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| request_failed(Self::PROVIDER, 0, format!("HTTP request failed: {}", e)))?;

        Self::decode(response).await
    }

    /// GET an endpoint and decode the JSON response.
    pub async fn get<Res: DeserializeOwned>(&self, endpoint: &str) -> Result<Res, LlmError> {
        self.pacer.until_ready().await;

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .send()
            .await
            .map_err(|e| request_failed(Self::PROVIDER, 0, format!("HTTP request failed: {}", e)))?;

        Self::decode(response).await
    }

    async fn decode<Res: DeserializeOwned>(response: reqwest::Response) -> Result<Res, LlmError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| {
                invalid_response(Self::PROVIDER, format!("Failed to parse response: {}", e))
            })
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let error_msg = match serde_json::from_str::<ApiError>(&error_text) {
                Ok(api_error) => api_error.error.message,
                Err(_) => error_text,
            };

            Err(status_error(Self::PROVIDER, status, error_msg))
        }
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
