//! Engine over an LLM provider — the tool-calling round loop
//!
//! Each `send` spawns one task that alternates model calls and tool
//! execution until the model stops asking for tools. Events go out through a
//! channel that the caller reads as a [`SessionEventStream`].

use crate::engine::{
    Engine, EngineError, EngineSession, SessionConfig, SessionEvent, SessionEventStream,
};
use futures::StreamExt;
use groundloop_core::config::EngineConfig;
use groundloop_llm::{
    AccumulatedToolCall, ContentBlock, LlmMessage, LlmProvider, LlmRequest, StreamDelta,
};
use groundloop_tools::{ToolRegistry, ToolResult};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_RESULT_CHARS: usize = 50_000;

#[derive(Clone, Debug)]
pub struct LlmEngineConfig {
    pub model: String,
    pub max_tokens: u32,
    pub max_tool_rounds: usize,
}

impl From<&EngineConfig> for LlmEngineConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_tool_rounds: config.max_tool_rounds.max(1),
        }
    }
}

impl Default for LlmEngineConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

pub struct LlmEngine {
    provider: Arc<dyn LlmProvider>,
    config: LlmEngineConfig,
}

impl LlmEngine {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmEngineConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }
}

#[async_trait::async_trait]
impl Engine for LlmEngine {
    async fn open_session(
        &self,
        config: SessionConfig,
    ) -> Result<Box<dyn EngineSession>, EngineError> {
        debug!(
            "opening session {} with {} tools via {}",
            config.session_id,
            config.tools.len(),
            self.provider.name()
        );
        Ok(Box::new(LlmSession {
            id: config.session_id,
            system_prompt: config.system_prompt,
            tools: config.tools,
            provider: self.provider.clone(),
            config: self.config.clone(),
            history: Arc::new(Mutex::new(Vec::new())),
            cancel: CancellationToken::new(),
            task: None,
            closed: false,
        }))
    }
}

pub struct LlmSession {
    id: String,
    system_prompt: String,
    tools: Arc<ToolRegistry>,
    provider: Arc<dyn LlmProvider>,
    config: LlmEngineConfig,
    history: Arc<Mutex<Vec<LlmMessage>>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

#[async_trait::async_trait]
impl EngineSession for LlmSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&mut self, message: &str) -> Result<SessionEventStream, EngineError> {
        if self.closed {
            return Err(EngineError::Closed(self.id.clone()));
        }
        // One message in flight at a time.
        if let Some(previous) = self.task.take() {
            let _ = previous.await;
        }

        self.history.lock().await.push(LlmMessage::user(message));

        let (tx, mut rx) = mpsc::channel::<SessionEvent>(256);
        let turn = TurnRunner {
            session_id: self.id.clone(),
            system_prompt: self.system_prompt.clone(),
            tools: self.tools.clone(),
            provider: self.provider.clone(),
            config: self.config.clone(),
            history: self.history.clone(),
            cancel: self.cancel.clone(),
            tx,
        };
        self.task = Some(tokio::spawn(turn.run()));

        Ok(Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("session {} task ended abnormally: {}", self.id, e);
            }
        }
        debug!("session {} closed", self.id);
    }
}

impl Drop for LlmSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct TurnRunner {
    session_id: String,
    system_prompt: String,
    tools: Arc<ToolRegistry>,
    provider: Arc<dyn LlmProvider>,
    config: LlmEngineConfig,
    history: Arc<Mutex<Vec<LlmMessage>>>,
    cancel: CancellationToken,
    tx: mpsc::Sender<SessionEvent>,
}

impl TurnRunner {
    async fn emit(&self, event: SessionEvent) {
        // A dropped receiver means nobody is listening any more; keep going so
        // history stays consistent until the session is cancelled.
        let _ = self.tx.send(event).await;
    }

    async fn run(self) {
        let definitions = self.tools.definitions();

        for round in 1..=self.config.max_tool_rounds {
            if self.cancel.is_cancelled() {
                debug!("session {} cancelled before round {}", self.session_id, round);
                return;
            }

            let request = LlmRequest {
                model: self.config.model.clone(),
                messages: self.history.lock().await.clone(),
                tools: definitions.clone(),
                max_tokens: self.config.max_tokens,
                system: Some(self.system_prompt.clone()),
            };

            let (text, tool_calls) = match self.complete(request).await {
                Ok(output) => output,
                Err(message) => {
                    self.emit(SessionEvent::SessionError { message }).await;
                    return;
                }
            };

            if !text.is_empty() {
                self.emit(SessionEvent::AssistantMessage {
                    content: text.clone(),
                })
                .await;
            }

            let mut blocks = Vec::new();
            if !text.is_empty() {
                blocks.push(ContentBlock::Text { text });
            }
            let parsed: Vec<_> = tool_calls
                .into_iter()
                .map(|tc| {
                    let args = tc.parse_arguments();
                    (tc, args)
                })
                .collect();
            for (tc, args) in &parsed {
                blocks.push(ContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: args
                        .as_ref()
                        .map(|v| v.clone())
                        .unwrap_or_else(|_| serde_json::json!({})),
                });
            }
            if !blocks.is_empty() {
                self.history
                    .lock()
                    .await
                    .push(LlmMessage::assistant_blocks(blocks));
            }

            if parsed.is_empty() {
                self.emit(SessionEvent::SessionIdle).await;
                return;
            }

            let mut results = Vec::with_capacity(parsed.len());
            for (tc, args) in parsed {
                self.emit(SessionEvent::ToolExecutionStart {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                })
                .await;

                let result = match args {
                    Ok(args) => self.tools.execute(&tc.name, args).await,
                    Err(e) => ToolResult::error(format!("invalid arguments for {}: {}", tc.name, e)),
                };
                let is_error = result.is_error();
                let content = groundloop_tools::registry::truncate(
                    &result.to_content_string(),
                    MAX_RESULT_CHARS,
                );

                self.emit(SessionEvent::ToolExecutionComplete {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    result: content.clone(),
                    is_error,
                })
                .await;
                results.push(ContentBlock::ToolResult {
                    tool_use_id: tc.id,
                    content,
                    is_error: is_error.then_some(true),
                });
            }
            self.history
                .lock()
                .await
                .push(LlmMessage::tool_results(results));
            debug!("session {} finished tool round {}", self.session_id, round);
        }

        info!(
            "session {} reached {} tool rounds; going idle",
            self.session_id, self.config.max_tool_rounds
        );
        self.emit(SessionEvent::SessionIdle).await;
    }

    /// One model call. Returns the assistant text and completed tool calls.
    async fn complete(
        &self,
        request: LlmRequest,
    ) -> Result<(String, Vec<AccumulatedToolCall>), String> {
        let mut stream = self
            .provider
            .complete_stream(request, self.cancel.clone())
            .await
            .map_err(|e| e.to_string())?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut current: Option<AccumulatedToolCall> = None;

        while let Some(delta) = stream.next().await {
            match delta.map_err(|e| e.to_string())? {
                StreamDelta::Text(t) => text.push_str(&t),
                StreamDelta::ToolCallStart { id, name } => {
                    current = Some(AccumulatedToolCall {
                        id,
                        name,
                        arguments: String::new(),
                    });
                }
                StreamDelta::ToolCallDelta { arguments, .. } => {
                    if let Some(tool) = current.as_mut() {
                        tool.arguments.push_str(&arguments);
                    }
                }
                StreamDelta::ToolCallEnd { .. } => {
                    if let Some(tool) = current.take() {
                        tool_calls.push(tool);
                    }
                }
                StreamDelta::Done { stop_reason } => {
                    debug!("model stopped: {:?}", stop_reason);
                }
            }
        }

        Ok((text, tool_calls))
    }
}
