//! groundloop agent — the engine seam, the turn processor and the outer loop

pub mod engine;
pub mod llm_engine;
pub mod orchestrator;
pub mod prompt;
pub mod turn;

pub use engine::{
    Engine, EngineError, EngineSession, SessionConfig, SessionEvent, SessionEventStream,
};
pub use llm_engine::{LlmEngine, LlmEngineConfig};
pub use orchestrator::{IterationResult, LoopSettings, RunError, SessionOrchestrator};
pub use prompt::{build_system_prompt, PromptSource};
pub use turn::{SuccessPolicy, TurnEventProcessor, TurnReport, TurnState, TurnTrace};
