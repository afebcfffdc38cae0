//! OpenAI-compatible chat completions provider

use super::prompts::{build_estimation_prompt, system_prompt};
use super::types::EstimationRequest;
use super::EstimationProvider;
use crate::config::ProviderConfig;
use crate::error::{EstimatorError, Result};
use crate::metrics::METRICS;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Request parameters a model accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Token limit is sent as `max_completion_tokens` instead of `max_tokens`
    pub uses_max_completion_tokens: bool,
    pub supports_temperature: bool,
    pub supports_json_mode: bool,
}

impl ModelCapabilities {
    pub fn for_model(model: &str) -> Self {
        let uses_max_completion_tokens = matches!(model, "gpt-4o" | "gpt-4o-mini" | "o1-preview" | "o1-mini")
            || model.starts_with("gpt-5");
        let supports_temperature =
            !(matches!(model, "o1-preview" | "o1-mini") || model.starts_with("gpt-5-nano"));
        let supports_json_mode = matches!(
            model,
            "gpt-4o" | "gpt-4-turbo" | "gpt-4o-mini" | "gpt-3.5-turbo-1106" | "gpt-3.5-turbo"
        );

        Self {
            uses_max_completion_tokens,
            supports_temperature,
            supports_json_mode,
        }
    }
}

/// Cumulative API usage of one provider instance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub last_request_time: Option<DateTime<Utc>>,
}

impl UsageMetrics {
    pub fn average_tokens(&self) -> f64 {
        if self.request_count == 0 {
            return 0.0;
        }
        self.total_tokens as f64 / self.request_count as f64
    }
}

/// Estimation provider backed by an OpenAI-compatible API
pub struct OpenAiProvider {
    client: Client,
    config: ProviderConfig,
    usage: Mutex<UsageMetrics>,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EstimatorError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            usage: Mutex::new(UsageMetrics::default()),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Snapshot of usage so far
    pub fn usage(&self) -> UsageMetrics {
        self.usage.lock().map(|u| u.clone()).unwrap_or_default()
    }

    fn build_request(&self, request: &EstimationRequest) -> ChatCompletionRequest {
        let capabilities = ModelCapabilities::for_model(&self.config.model);
        let (max_tokens, max_completion_tokens) = if capabilities.uses_max_completion_tokens {
            (None, Some(self.config.max_tokens))
        } else {
            (Some(self.config.max_tokens), None)
        };

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_estimation_prompt(request),
                },
            ],
            max_tokens,
            max_completion_tokens,
            temperature: capabilities
                .supports_temperature
                .then_some(self.config.temperature),
            response_format: capabilities.supports_json_mode.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        }
    }

    fn record_error(&self) {
        if let Ok(mut usage) = self.usage.lock() {
            usage.error_count += 1;
        }
    }

    /// Count a completed request, with its token usage when reported
    fn record_success(&self, tokens: Option<&TokenUsage>) {
        if let Ok(mut usage) = self.usage.lock() {
            usage.request_count += 1;
            usage.last_request_time = Some(Utc::now());
            if let Some(tokens) = tokens {
                usage.prompt_tokens += tokens.prompt_tokens;
                usage.completion_tokens += tokens.completion_tokens;
                usage.total_tokens += tokens.total_tokens;
            }
        }
        if let Some(tokens) = tokens {
            METRICS.record_provider_tokens(tokens.prompt_tokens, tokens.completion_tokens);
        }
    }

    async fn send(&self, body: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let mut req = self.client.post(&self.config.api_url).json(body);
        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                EstimatorError::ContextCanceled(format!(
                    "provider request timed out after {}ms",
                    self.config.timeout_ms
                ))
            } else if e.is_connect() || e.is_request() {
                EstimatorError::ProviderUnavailable(format!(
                    "OpenAI API unreachable at {}: {}",
                    self.config.api_url, e
                ))
            } else {
                EstimatorError::Provider(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .map(|e| e.message)
                .unwrap_or_else(|| format!("status {}, body: {}", status, body));
            return Err(EstimatorError::Provider(format!("OpenAI API error: {}", message)));
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| EstimatorError::Provider(format!("failed to parse response: {}", e)))
    }
}

#[async_trait]
impl EstimationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn is_available(&self) -> bool {
        self.config.has_api_key()
    }

    async fn request_estimate(&self, request: &EstimationRequest) -> Result<String> {
        if !self.is_available() {
            return Err(EstimatorError::ProviderUnavailable(
                "OpenAI API key not configured".to_string(),
            ));
        }

        let body = self.build_request(request);
        info!("Requesting estimation from OpenAI (model: {})", self.config.model);

        let started = Instant::now();
        let result = self.send(&body).await;
        let elapsed = started.elapsed();
        METRICS.record_provider_request(elapsed);

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.record_error();
                warn!("OpenAI API call failed after {:?}: {}", elapsed, e);
                return Err(e);
            }
        };
        info!("OpenAI API call completed in {:?}", elapsed);

        if let Some(tokens) = &response.usage {
            info!(
                "Token usage - Prompt: {}, Completion: {}, Total: {}",
                tokens.prompt_tokens, tokens.completion_tokens, tokens.total_tokens
            );
        }
        self.record_success(response.usage.as_ref());

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            self.record_error();
            EstimatorError::Provider("no choices in OpenAI response".to_string())
        })?;
        let content = choice.message.content.unwrap_or_default();

        debug!(
            "Response finish reason: {}, content length: {} chars",
            choice.finish_reason.as_deref().unwrap_or("unknown"),
            content.len()
        );

        Ok(content)
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
