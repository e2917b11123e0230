//! groundloop LLM - streaming model backend for the engine adapter

pub mod anthropic;
pub mod provider;
pub mod types;

pub use anthropic::{AnthropicProvider, SseDecoder};
pub use provider::{LlmError, LlmProvider, LlmResult, LlmStream};
pub use tokio_util::sync::CancellationToken;
pub use types::*;
