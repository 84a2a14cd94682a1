//! Anthropic Messages API transport.
//!
//! Maps the provider-neutral [`Turn`] history onto `/v1/messages`:
//!
//! | Neutral block | Wire block |
//! |---------------|------------|
//! | `Text` | `{"type":"text"}` |
//! | `Document` | `{"type":"document","source":{"type":"base64",...}}` |
//! | `ToolUse` | `{"type":"tool_use","id","name","input"}` |
//! | `ToolResult` | `{"type":"tool_result","tool_use_id","content","is_error"}` |
//!
//! ## Retry Strategy
//!
//! 429, 5xx and connection/timeout failures are retried with exponential
//! backoff (`retry_backoff_ms * 2^(attempt-1)`); a `retry-after` header, when
//! present, replaces the computed wait. Every wait is capped at
//! [`MAX_RETRY_WAIT`]. Authentication failures and other
//! 4xx responses are returned immediately.

use crate::error::HighlightError;
use crate::pipeline::conversation::{
    AgentResponse, ContentBlock, ConversationTransport, RequestOptions, Role, StopSignal,
    TokenUsage, ToolInvocation, ToolSchema, Turn,
};
use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const PROVIDER: &str = "anthropic";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// `anthropic-version` header value.
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Model used when neither the config nor the request names one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Upper bound on a single retry wait, computed or server-sent.
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

/// Connection settings for [`AnthropicTransport`].
#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub api_version: String,
    /// Per-request timeout. Default: 120 s.
    pub timeout_secs: u64,
    /// Retries after the first attempt. Default: 3.
    pub max_retries: u32,
    /// Base backoff. Default: 500 ms.
    pub retry_backoff_ms: u64,
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout_secs: 120,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }

    /// Read `ANTHROPIC_API_KEY`, `ANTHROPIC_BASE_URL` and `PDF_HIGHLIGHT_MODEL`.
    pub fn from_env() -> Result<Self, HighlightError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| HighlightError::ProviderNotConfigured {
                provider: PROVIDER.to_string(),
                hint: "Set ANTHROPIC_API_KEY or pass a transport via HighlightConfigBuilder::transport."
                    .to_string(),
            })?;
        let mut config = Self::new(api_key);
        if let Ok(base) = std::env::var("ANTHROPIC_BASE_URL") {
            if !base.trim().is_empty() {
                config.base_url = base;
            }
        }
        if let Ok(model) = std::env::var("PDF_HIGHLIGHT_MODEL") {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        Ok(config)
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// [`ConversationTransport`] over the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicTransport {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicTransport {
    pub fn new(config: AnthropicConfig) -> Result<Self, HighlightError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HighlightError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, HighlightError> {
        Self::new(AnthropicConfig::from_env()?)
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    /// One HTTP exchange, no retry.
    async fn send_once(&self, body: &MessagesRequest<'_>) -> Result<AgentResponse, Attempt> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let retryable = e.is_timeout() || e.is_connect() || e.is_request();
                Attempt {
                    error: HighlightError::TransportFailed {
                        message: format!("HTTP request failed: {e}"),
                    },
                    retryable,
                    wait: None,
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(Attempt {
                error: HighlightError::RateLimitExceeded {
                    provider: PROVIDER.to_string(),
                    retry_after_secs,
                },
                retryable: true,
                wait: retry_after_secs.map(Duration::from_secs),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(err) => format!("{}: {}", err.error.error_type, err.error.message),
                Err(_) => format!("HTTP {status}: {body}"),
            };
            let error = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                HighlightError::AuthError {
                    provider: PROVIDER.to_string(),
                    detail,
                }
            } else {
                HighlightError::TransportFailed {
                    message: format!("Anthropic API error ({status}) {detail}"),
                }
            };
            return Err(Attempt {
                error,
                retryable: status.is_server_error(),
                wait: None,
            });
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| Attempt {
            error: HighlightError::MalformedResponse {
                detail: format!("Failed to parse Messages API response: {e}"),
            },
            retryable: false,
            wait: None,
        })?;
        Ok(parsed.into_agent_response())
    }
}

/// A failed attempt and whether another one may succeed.
struct Attempt {
    error: HighlightError,
    retryable: bool,
    wait: Option<Duration>,
}

#[async_trait]
impl ConversationTransport for AnthropicTransport {
    async fn send(
        &self,
        turns: &[Turn],
        tools: &[ToolSchema],
        options: &RequestOptions,
    ) -> Result<AgentResponse, HighlightError> {
        let body = MessagesRequest {
            model: options.model.as_deref().unwrap_or(&self.config.model),
            max_tokens: options.max_tokens,
            system: options.system_prompt.as_deref(),
            temperature: options.temperature,
            messages: turns.iter().map(ApiMessage::from_turn).collect(),
            tools: tools.iter().map(ApiTool::from).collect(),
        };

        let mut attempt: u32 = 0;
        loop {
            match self.send_once(&body).await {
                Ok(response) => {
                    debug!(
                        "Messages API replied: stop={:?}, {} blocks",
                        response.stop,
                        response.content.len()
                    );
                    return Ok(response);
                }
                Err(failed) if failed.retryable && attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff =
                        retry_delay(self.config.retry_backoff_ms, attempt, failed.wait);
                    warn!(
                        "Anthropic request failed ({}); retry {}/{} after {}ms",
                        failed.error,
                        attempt,
                        self.config.max_retries,
                        backoff.as_millis()
                    );
                    sleep(backoff).await;
                }
                Err(failed) => return Err(failed.error),
            }
        }
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// Wait before retry number `attempt` (1-based).
fn retry_delay(backoff_ms: u64, attempt: u32, server_wait: Option<Duration>) -> Duration {
    let wait = server_wait.unwrap_or_else(|| {
        let factor = 2u64
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(backoff_ms.saturating_mul(factor))
    });
    wait.min(MAX_RETRY_WAIT)
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    temperature: f32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiBlock>,
}

impl ApiMessage {
    fn from_turn(turn: &Turn) -> Self {
        Self {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: turn.content.iter().map(ApiBlock::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    Document {
        source: DocumentSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct DocumentSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

impl From<&ContentBlock> for ApiBlock {
    fn from(block: &ContentBlock) -> Self {
        match block {
            ContentBlock::Text(text) => ApiBlock::Text { text: text.clone() },
            ContentBlock::Document { media_type, data } => ApiBlock::Document {
                source: DocumentSource {
                    kind: "base64",
                    media_type: media_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                },
            },
            ContentBlock::ToolUse(call) => ApiBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.arguments.clone(),
            },
            ContentBlock::ToolResult {
                call_id,
                content,
                is_error,
            } => ApiBlock::ToolResult {
                tool_use_id: call_id.clone(),
                content: content.clone(),
                is_error: *is_error,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

impl From<&ToolSchema> for ApiTool {
    fn from(tool: &ToolSchema) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.input_schema.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl MessagesResponse {
    fn into_agent_response(self) -> AgentResponse {
        let content = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(ContentBlock::Text(text)),
                ResponseBlock::ToolUse { id, name, input } => {
                    Some(ContentBlock::ToolUse(ToolInvocation {
                        id,
                        name,
                        arguments: input,
                    }))
                }
                ResponseBlock::Other => None,
            })
            .collect();
        AgentResponse {
            content,
            stop: StopSignal::from_reason(self.stop_reason.as_deref()),
            usage: TokenUsage {
                input_tokens: self.usage.input_tokens,
                output_tokens: self.usage.output_tokens,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn retry_delay_doubles_then_caps() {
        assert_eq!(retry_delay(500, 1, None), Duration::from_millis(500));
        assert_eq!(retry_delay(500, 3, None), Duration::from_millis(2000));
        assert_eq!(retry_delay(500, 65, None), MAX_RETRY_WAIT);
        assert_eq!(retry_delay(500, u32::MAX, None), MAX_RETRY_WAIT);
    }

    #[test]
    fn retry_delay_prefers_server_wait_within_cap() {
        let short = Some(Duration::from_secs(2));
        assert_eq!(retry_delay(500, 1, short), Duration::from_secs(2));
        let huge = Some(Duration::from_secs(86_400));
        assert_eq!(retry_delay(500, 1, huge), MAX_RETRY_WAIT);
    }

    #[test]
    fn document_block_is_base64() {
        let block = ContentBlock::Document {
            media_type: "application/pdf".into(),
            data: Arc::from(&b"%PDF"[..]),
        };
        let wire = serde_json::to_value(ApiBlock::from(&block)).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "document",
                "source": {"type": "base64", "media_type": "application/pdf", "data": "JVBERg=="}
            })
        );
    }

    #[test]
    fn tool_result_echoes_id() {
        let block = ContentBlock::ToolResult {
            call_id: "toolu_1".into(),
            content: "acknowledged".into(),
            is_error: false,
        };
        let wire = serde_json::to_value(ApiBlock::from(&block)).unwrap();
        assert_eq!(wire["type"], "tool_result");
        assert_eq!(wire["tool_use_id"], "toolu_1");
        assert_eq!(wire["is_error"], false);
    }

    #[test]
    fn response_maps_tool_use_and_stop_reason() {
        let raw = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Flagging one clause."},
                {"type": "tool_use", "id": "toolu_9", "name": "highlight_pdf", "input": {"pageNumber": 1}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 1200, "output_tokens": 80}
        });
        let parsed: MessagesResponse = serde_json::from_value(raw).unwrap();
        let response = parsed.into_agent_response();
        assert_eq!(response.stop, StopSignal::ToolUse);
        assert_eq!(response.content.len(), 2);
        assert_eq!(response.usage.input_tokens, 1200);
        match &response.content[1] {
            ContentBlock::ToolUse(call) => {
                assert_eq!(call.id, "toolu_9");
                assert_eq!(call.arguments["pageNumber"], 1);
            }
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn unknown_stop_reason_is_kept_verbatim() {
        let parsed: MessagesResponse = serde_json::from_value(json!({
            "content": [],
            "stop_reason": "max_tokens"
        }))
        .unwrap();
        assert_eq!(
            parsed.into_agent_response().stop,
            StopSignal::Other("max_tokens".into())
        );
    }

    #[test]
    fn debug_redacts_api_key() {
        let dbg = format!("{:?}", AnthropicConfig::new("sk-secret"));
        assert!(!dbg.contains("sk-secret"));
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let transport =
            AnthropicTransport::new(AnthropicConfig::new("k").base_url("http://localhost:9/")).unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:9/v1/messages");
    }
}
