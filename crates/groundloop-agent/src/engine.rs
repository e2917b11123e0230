//! Engine seam — the conversational backend the orchestrator drives
//!
//! An [`Engine`] opens sessions; a session accepts one user message and
//! answers with a stream of [`SessionEvent`]s ending in `SessionIdle` or
//! `SessionError`. Sessions never outlive the iteration that opened them.

use futures::Stream;
use groundloop_tools::ToolRegistry;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    AssistantMessage {
        content: String,
    },
    ToolExecutionStart {
        id: String,
        name: String,
    },
    ToolExecutionComplete {
        id: String,
        name: String,
        result: String,
        is_error: bool,
    },
    /// The engine finished processing the message.
    SessionIdle,
    SessionError {
        message: String,
    },
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionIdle | Self::SessionError { .. })
    }
}

pub type SessionEventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

#[derive(Clone)]
pub struct SessionConfig {
    pub session_id: String,
    pub system_prompt: String,
    pub tools: Arc<ToolRegistry>,
}

impl SessionConfig {
    /// A config with a fresh random session id.
    pub fn fresh(system_prompt: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            system_prompt: system_prompt.into(),
            tools,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("session {0} already closed")]
    Closed(String),

    #[error("send failed: {0}")]
    Send(String),
}

#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    async fn open_session(
        &self,
        config: SessionConfig,
    ) -> Result<Box<dyn EngineSession>, EngineError>;
}

#[async_trait::async_trait]
pub trait EngineSession: Send {
    fn id(&self) -> &str;

    async fn send(&mut self, message: &str) -> Result<SessionEventStream, EngineError>;

    /// Release the session. Safe to call after a failed send.
    async fn close(&mut self);
}
