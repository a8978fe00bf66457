//! LLM Transport Module
//!
//! A unified interface for issuing writer and rewriter prompts against LLM
//! providers (OpenAI, Anthropic Claude, and Ollama for local models). The
//! transport performs no retries; retry policy belongs to the pipeline.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::parser;

/// LLM provider enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum LlmProvider {
    /// OpenAI GPT models
    OpenAi,
    /// Anthropic Claude models
    Anthropic,
    /// Ollama local models
    Ollama,
}

impl std::str::FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "anthropic" => Ok(LlmProvider::Anthropic),
            "ollama" => Ok(LlmProvider::Ollama),
            _ => Err(anyhow!("unsupported LLM provider: {}", s)),
        }
    }
}

/// One prompt issued to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest {
    pub model: String,
    pub prompt: String,
    /// Sampling temperature (0.0 to 2.0).
    pub temperature: f64,
    pub max_output_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Token usage statistics reported by a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Events emitted by a streaming call, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One complete sentinel-terminated block.
    Item(String),
    /// Fired exactly once when the stream ended mid-block; carries the tail.
    Truncated(String),
}

/// Swappable transport seam. Implementations must emit one `Item` event per
/// complete sentinel-terminated block in arrival order and at most one
/// `Truncated` event, and must not retry internally.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// Issue a prompt and return the full response text.
    async fn call_one(&self, request: LlmRequest) -> Result<String>;

    /// Issue a prompt, splitting the response into sentinel-delimited item
    /// events. The default implementation performs one full-text call and
    /// splits it, which satisfies the event contract for non-SSE providers.
    async fn call_streaming(
        &self,
        request: LlmRequest,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let text = self.call_one(request).await?;
        let parsed = parser::split_stream(&text);
        for block in parsed.blocks {
            events
                .send(StreamEvent::Item(block))
                .await
                .map_err(|_| anyhow!("stream receiver dropped"))?;
        }
        if let Some(leftover) = parsed.leftover {
            events
                .send(StreamEvent::Truncated(leftover))
                .await
                .map_err(|_| anyhow!("stream receiver dropped"))?;
        }
        Ok(())
    }
}

/// Cumulative transport usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransportStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens: usize,
    pub average_response_time_ms: f64,
}

/// Connection settings for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub provider: LlmProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            api_key: None,
            base_url: None,
            timeout_seconds: 120,
        }
    }
}

/// HTTP transport backed by a single configured provider.
pub struct HttpLlmTransport {
    settings: ProviderSettings,
    client: reqwest::Client,
    stats: std::sync::Mutex<TransportStats>,
}

impl HttpLlmTransport {
    /// Create a transport. Fails when the provider requires an API key and
    /// none is configured; this is the one configuration error allowed to
    /// escape the pipeline unchanged.
    pub fn new(settings: ProviderSettings) -> Result<Self> {
        if settings.provider != LlmProvider::Ollama && settings.api_key.is_none() {
            return Err(anyhow!(
                "API key required for provider: {:?}",
                settings.provider
            ));
        }
        Ok(Self {
            settings,
            client: reqwest::Client::new(),
            stats: std::sync::Mutex::new(TransportStats::default()),
        })
    }

    /// Snapshot of the usage statistics.
    pub fn stats(&self) -> TransportStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn api_key(&self) -> Result<&str> {
        self.settings
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("provider API key not configured"))
    }

    async fn send_openai(&self, request: &LlmRequest) -> Result<(String, TokenUsage)> {
        let url = format!(
            "{}/chat/completions",
            self.settings
                .base_url
                .as_deref()
                .unwrap_or("https://api.openai.com/v1")
        );
        let body = serde_json::json!({
            "model": request.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "temperature": request.temperature,
            "max_tokens": request.max_output_tokens,
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key()?)
            .json(&body)
            .timeout(Duration::from_secs(self.settings.timeout_seconds))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("OpenAI API error: {}", response.status()));
        }
        let value: serde_json::Value = response.json().await?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("no content in OpenAI response"))?
            .to_string();
        let usage = TokenUsage {
            prompt_tokens: value["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as usize,
            completion_tokens: value["usage"]["completion_tokens"].as_u64().unwrap_or(0) as usize,
            total_tokens: value["usage"]["total_tokens"].as_u64().unwrap_or(0) as usize,
        };
        Ok((content, usage))
    }

    async fn send_anthropic(&self, request: &LlmRequest) -> Result<(String, TokenUsage)> {
        let url = format!(
            "{}/v1/messages",
            self.settings
                .base_url
                .as_deref()
                .unwrap_or("https://api.anthropic.com")
        );
        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_output_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .timeout(Duration::from_secs(self.settings.timeout_seconds))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("Anthropic API error: {}", response.status()));
        }
        let value: serde_json::Value = response.json().await?;
        let content = value["content"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow!("no content in Anthropic response"))?
            .to_string();
        let input = value["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize;
        let output = value["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize;
        let usage = TokenUsage {
            prompt_tokens: input,
            completion_tokens: output,
            total_tokens: input + output,
        };
        Ok((content, usage))
    }

    async fn send_ollama(&self, request: &LlmRequest) -> Result<(String, TokenUsage)> {
        let url = format!(
            "{}/api/generate",
            self.settings
                .base_url
                .as_deref()
                .unwrap_or("http://localhost:11434")
        );
        let body = serde_json::json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_output_tokens,
            }
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(self.settings.timeout_seconds))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("Ollama API error: {}", response.status()));
        }
        let value: serde_json::Value = response.json().await?;
        let content = value["response"]
            .as_str()
            .ok_or_else(|| anyhow!("no content in Ollama response"))?
            .to_string();
        // Ollama reports no detailed token usage; estimate from length.
        let estimated = (content.len() / 4).max(1);
        let usage = TokenUsage {
            prompt_tokens: estimated,
            completion_tokens: estimated,
            total_tokens: estimated * 2,
        };
        Ok((content, usage))
    }

    fn record_outcome(&self, elapsed_ms: u64, usage: Option<&TokenUsage>) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.total_requests += 1;
            match usage {
                Some(usage) => {
                    stats.successful_requests += 1;
                    stats.total_tokens += usage.total_tokens;
                    let total_time =
                        stats.average_response_time_ms * (stats.successful_requests - 1) as f64;
                    stats.average_response_time_ms =
                        (total_time + elapsed_ms as f64) / stats.successful_requests as f64;
                }
                None => stats.failed_requests += 1,
            }
        }
    }
}

#[async_trait]
impl LlmTransport for HttpLlmTransport {
    async fn call_one(&self, request: LlmRequest) -> Result<String> {
        let start = std::time::Instant::now();
        debug!(
            "sending LLM request to {:?} model {}",
            self.settings.provider, request.model
        );

        let result = match self.settings.provider {
            LlmProvider::OpenAi => self.send_openai(&request).await,
            LlmProvider::Anthropic => self.send_anthropic(&request).await,
            LlmProvider::Ollama => self.send_ollama(&request).await,
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok((content, usage)) => {
                self.record_outcome(elapsed_ms, Some(&usage));
                info!(
                    "LLM request completed in {}ms ({} tokens)",
                    elapsed_ms, usage.total_tokens
                );
                Ok(content)
            }
            Err(e) => {
                self.record_outcome(elapsed_ms, None);
                error!("LLM request failed: {}", e);
                Err(e)
            }
        }
    }
}
