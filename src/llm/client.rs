use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{SamplingParams, TraceRecord};

use super::pricing::estimate_cost;

/// One model invocation request: the tuple every stage and judge call
/// hands to the invoker.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Purpose label recorded on the trace (e.g. "stage:facts")
    pub label: String,
    /// Model to invoke
    pub model: String,
    /// System message, if any
    pub system_prompt: Option<String>,
    /// User message
    pub user_prompt: String,
    /// Sampling parameters
    pub sampling: SamplingParams,
}

/// A successful invocation: the completion text plus its billed trace
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub trace: TraceRecord,
}

/// Provider failure taxonomy. Every variant carries the failed attempt's
/// trace: duration is always measured, tokens/cost populated when the
/// provider billed the failed call.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider unreachable or returned a server error; worth retrying
    #[error("provider unreachable: {message}")]
    ProviderUnavailable { message: String, trace: TraceRecord },
    /// Client error (bad model id, content filtered, quota); retrying
    /// cannot fix it
    #[error("provider rejected the request: {message}")]
    ProviderRejected { message: String, trace: TraceRecord },
    /// Call exceeded the configured deadline; worth retrying
    #[error("provider call exceeded the {timeout_ms}ms deadline")]
    ProviderTimeout { timeout_ms: u64, trace: TraceRecord },
}

impl LlmError {
    /// The failed attempt's trace record
    pub fn trace(&self) -> &TraceRecord {
        match self {
            Self::ProviderUnavailable { trace, .. }
            | Self::ProviderRejected { trace, .. }
            | Self::ProviderTimeout { trace, .. } => trace,
        }
    }

    /// Transient errors are retried with backoff; rejections are not
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::ProviderRejected { .. })
    }
}

/// The single choke point all higher components invoke models through
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(&self, request: &LlmRequest) -> Result<Completion, LlmError>;
}

/// Configuration for the Anthropic API client. Constructed once and
/// passed in explicitly; there is no process-global credential state.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key (from ANTHROPIC_API_KEY env var)
    pub api_key: String,
    /// Messages API endpoint
    pub base_url: String,
    /// Per-call deadline in milliseconds
    pub timeout_ms: u64,
}

impl AnthropicConfig {
    /// Read the API key from the environment, once, at construction
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;
        Ok(Self::new(api_key))
    }

    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
            timeout_ms: 120_000,
        }
    }
}

/// Anthropic Messages API backend
pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn attempt_trace(
        request: &LlmRequest,
        input_tokens: u64,
        output_tokens: u64,
        duration_ms: u64,
        succeeded: bool,
    ) -> TraceRecord {
        TraceRecord {
            label: request.label.clone(),
            model: request.model.clone(),
            sampling: request.sampling,
            input_tokens,
            output_tokens,
            cost_usd: estimate_cost(&request.model, input_tokens, output_tokens),
            duration_ms,
            succeeded,
            system_prompt: request.system_prompt.clone(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn invoke(&self, request: &LlmRequest) -> Result<Completion, LlmError> {
        let body = AnthropicRequest {
            model: request.model.clone(),
            max_tokens: request.sampling.max_tokens,
            temperature: Some(request.sampling.temperature),
            top_p: Some(request.sampling.top_p),
            system: request.system_prompt.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.user_prompt.clone(),
            }],
        };

        let started = Instant::now();
        let deadline = Duration::from_millis(self.config.timeout_ms);
        let elapsed_ms = |started: Instant| started.elapsed().as_millis() as u64;

        // Request-level timeout: spans connect, headers, and body reads
        let send = self
            .client
            .post(&self.config.base_url)
            .timeout(deadline)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let response = match send.await {
            Err(e) if e.is_timeout() => {
                return Err(LlmError::ProviderTimeout {
                    timeout_ms: self.config.timeout_ms,
                    trace: Self::attempt_trace(request, 0, 0, elapsed_ms(started), false),
                });
            }
            Err(e) => {
                return Err(LlmError::ProviderUnavailable {
                    message: e.to_string(),
                    trace: Self::attempt_trace(request, 0, 0, elapsed_ms(started), false),
                });
            }
            Ok(response) => response,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{status}: {body}");
            let trace = Self::attempt_trace(request, 0, 0, elapsed_ms(started), false);
            // 4xx is a request problem; 5xx/429-free server trouble is transient
            return if status.is_client_error() {
                Err(LlmError::ProviderRejected { message, trace })
            } else {
                Err(LlmError::ProviderUnavailable { message, trace })
            };
        }

        let parsed: AnthropicResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) if e.is_timeout() => {
                return Err(LlmError::ProviderTimeout {
                    timeout_ms: self.config.timeout_ms,
                    trace: Self::attempt_trace(request, 0, 0, elapsed_ms(started), false),
                });
            }
            Err(e) => {
                return Err(LlmError::ProviderUnavailable {
                    message: format!("malformed provider response: {e}"),
                    trace: Self::attempt_trace(request, 0, 0, elapsed_ms(started), false),
                });
            }
        };

        let duration_ms = elapsed_ms(started);
        let input_tokens = parsed.usage.input_tokens;
        let output_tokens = parsed.usage.output_tokens;

        let text = parsed
            .content
            .iter()
            .find(|block| block.content_type == "text")
            .map(|block| block.text.clone());

        match text {
            Some(text) => Ok(Completion {
                text,
                trace: Self::attempt_trace(request, input_tokens, output_tokens, duration_ms, true),
            }),
            // Billed, but no usable text came back
            None => Err(LlmError::ProviderRejected {
                message: "no text content in provider response".to_string(),
                trace: Self::attempt_trace(request, input_tokens, output_tokens, duration_ms, false),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LlmRequest {
        LlmRequest {
            label: "stage:facts".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            system_prompt: Some("sys".to_string()),
            user_prompt: "user".to_string(),
            sampling: SamplingParams::default(),
        }
    }

    #[test]
    fn test_error_transience() {
        let trace = AnthropicClient::attempt_trace(&request(), 0, 0, 5, false);
        let unavailable = LlmError::ProviderUnavailable {
            message: "down".to_string(),
            trace: trace.clone(),
        };
        let timeout = LlmError::ProviderTimeout {
            timeout_ms: 1000,
            trace: trace.clone(),
        };
        let rejected = LlmError::ProviderRejected {
            message: "bad model".to_string(),
            trace,
        };
        assert!(unavailable.is_transient());
        assert!(timeout.is_transient());
        assert!(!rejected.is_transient());
    }

    #[test]
    fn test_attempt_trace_carries_request_fields() {
        let trace = AnthropicClient::attempt_trace(&request(), 1000, 500, 42, true);
        assert_eq!(trace.label, "stage:facts");
        assert_eq!(trace.model, "claude-sonnet-4-20250514");
        assert_eq!(trace.duration_ms, 42);
        assert!(trace.succeeded);
        assert!(trace.cost_usd > 0.0);
        assert_eq!(trace.system_prompt.as_deref(), Some("sys"));
    }

    #[tokio::test]
    async fn test_stalled_response_body_hits_the_deadline() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            // Headers promise a body that never arrives
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 512\r\n\r\n",
                )
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let mut config = AnthropicConfig::new("test-key".to_string());
        config.base_url = format!("http://{addr}");
        config.timeout_ms = 200;
        let client = AnthropicClient::new(config);

        let error = client.invoke(&request()).await.unwrap_err();
        assert!(matches!(error, LlmError::ProviderTimeout { timeout_ms: 200, .. }));
        assert!(!error.trace().succeeded);
        server.abort();
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "content": [{"type": "text", "text": "hello"}],
            "usage": {"input_tokens": 12, "output_tokens": 3}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text, "hello");
        assert_eq!(parsed.usage.input_tokens, 12);
    }
}
