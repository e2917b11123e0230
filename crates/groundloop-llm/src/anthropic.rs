//! Anthropic Messages API provider with SSE streaming

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, StreamDelta};
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete_stream(
        &self,
        request: LlmRequest,
        cancel: CancellationToken,
    ) -> LlmResult<LlmStream> {
        let mut body = serde_json::to_value(&request)
            .map_err(|e| LlmError::RequestFailed(format!("encode request: {}", e)))?;
        body["stream"] = serde_json::Value::Bool(true);

        debug!(
            "Anthropic request: model={} messages={} tools={}",
            request.model,
            request.messages.len(),
            request.tools.len()
        );

        let send = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            response = send => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic error {}: {}", status, error_text);
            return Err(match status.as_u16() {
                401 => LlmError::AuthFailed(error_text),
                429 => LlmError::RateLimited {
                    retry_after_ms: 60_000,
                },
                _ => LlmError::RequestFailed(format!("{}: {}", status, error_text)),
            });
        }

        Ok(Box::pin(delta_stream(response.bytes_stream(), cancel)))
    }
}

fn delta_stream(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = LlmResult<StreamDelta>> + Send {
    async_stream::stream! {
        let mut decoder = SseDecoder::default();
        tokio::pin!(bytes_stream);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = bytes_stream.next() => Some(next),
            };

            match next {
                None => {
                    yield Err(LlmError::Cancelled);
                    break;
                }
                Some(Some(Ok(chunk))) => {
                    for item in decoder.push(&chunk) {
                        yield item;
                    }
                }
                Some(Some(Err(e))) => {
                    yield Err(LlmError::StreamError(e.to_string()));
                    break;
                }
                Some(None) => break,
            }
        }
    }
}

/// Incremental decoder for the Messages API event stream.
///
/// Bytes may split events anywhere, including inside a multi-byte character.
/// Raw bytes are buffered; each complete event (terminated by a blank line)
/// is decoded as UTF-8 once and the remainder is kept for the next chunk.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    current_tool_id: Option<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<LlmResult<StreamDelta>> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let event = String::from_utf8_lossy(&raw);
            let mut event_type = "";
            let mut data = "";
            for line in event.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    event_type = rest;
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = rest;
                }
            }
            if data.is_empty() {
                continue;
            }
            if let Some(item) = self.decode_event(event_type, data) {
                out.push(item);
            }
        }
        out
    }

    fn decode_event(&mut self, event_type: &str, data: &str) -> Option<LlmResult<StreamDelta>> {
        match event_type {
            "content_block_start" => {
                let start: ContentBlockStart = serde_json::from_str(data).ok()?;
                match start.content_block {
                    StartBlock::ToolUse { id, name } => {
                        self.current_tool_id = Some(id.clone());
                        Some(Ok(StreamDelta::ToolCallStart { id, name }))
                    }
                    StartBlock::Other => None,
                }
            }
            "content_block_delta" => {
                let delta: ContentBlockDelta = serde_json::from_str(data).ok()?;
                match delta.delta {
                    BlockDelta::TextDelta { text } => Some(Ok(StreamDelta::Text(text))),
                    BlockDelta::InputJsonDelta { partial_json } => {
                        let id = self.current_tool_id.clone()?;
                        Some(Ok(StreamDelta::ToolCallDelta {
                            id,
                            arguments: partial_json,
                        }))
                    }
                    BlockDelta::Other => None,
                }
            }
            "content_block_stop" => self
                .current_tool_id
                .take()
                .map(|id| Ok(StreamDelta::ToolCallEnd { id })),
            "message_delta" => {
                let delta: MessageDelta = serde_json::from_str(data).ok()?;
                delta
                    .delta
                    .stop_reason
                    .map(|reason| Ok(StreamDelta::Done {
                        stop_reason: Some(reason),
                    }))
            }
            "error" => {
                let message = serde_json::from_str::<ErrorEvent>(data)
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| data.to_string());
                Some(Err(LlmError::StreamError(message)))
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ContentBlockStart {
    content_block: StartBlock,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum StartBlock {
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: BlockDelta,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum BlockDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
}

#[derive(Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}
