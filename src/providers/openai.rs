use crate::providers::base::{ChatRequest, LLMProvider, LLMResponse, ProviderMetrics};
use crate::providers::errors::ProviderErrorHandler;
use crate::providers::provider_http_client;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// Chat-completions client for OpenAI and OpenAI-compatible endpoints.
pub struct OpenAIProvider {
    api_key: String,
    default_model: String,
    base_url: String,
    client: Client,
    metrics: Arc<Mutex<ProviderMetrics>>,
}

impl OpenAIProvider {
    pub fn new(api_key: String, default_model: Option<String>) -> Self {
        Self::with_config(
            api_key,
            default_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            DEFAULT_BASE_URL.to_string(),
        )
    }

    /// Client for a specific model and base endpoint (compatible gateways,
    /// test doubles). `base_url` is the API root, without `/chat/completions`.
    pub fn with_config(api_key: String, default_model: String, base_url: String) -> Self {
        Self {
            api_key,
            default_model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: provider_http_client(),
            metrics: Arc::new(Mutex::new(ProviderMetrics::default())),
        }
    }

    fn parse_response(json: &Value) -> Result<LLMResponse> {
        let choice = json["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .context("No choices in OpenAI response")?;

        let content = choice["message"]["content"]
            .as_str()
            .map(std::string::ToString::to_string);

        Ok(LLMResponse { content })
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(&self, req: ChatRequest) -> Result<LLMResponse> {
        let messages: Vec<Value> = req
            .messages
            .into_iter()
            .map(|msg| {
                json!({
                    "role": msg.role,
                    "content": msg.content,
                })
            })
            .collect();

        let payload = json!({
            "model": self.default_model,
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        let json = ProviderErrorHandler::check_response(resp, "OpenAI", &self.metrics).await?;

        // Update metrics on success
        {
            if let Ok(mut metrics) = self.metrics.lock() {
                metrics.request_count += 1;
                if let Some(usage) = json.get("usage").and_then(|u| u.as_object())
                    && let Some(tokens) = usage.get("total_tokens").and_then(|t| t.as_u64())
                {
                    metrics.token_count += tokens;
                }
            }
        }

        Self::parse_response(&json)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}
