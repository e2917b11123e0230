//! The bounded outer loop: one fresh session per iteration until the
//! sentinel shows up or the budget runs out.

use crate::engine::{Engine, EngineError, SessionConfig};
use crate::prompt::{build_system_prompt, PromptSource};
use crate::turn::{SuccessPolicy, TurnEventProcessor, TurnReport};
use groundloop_core::config::{RunConfig, DEFAULT_NEXT_MOVE, DEFAULT_SENTINEL};
use groundloop_core::{IterationCounter, RunReport, SessionTurnOutcome, StateStore, TerminalStatus};
use groundloop_tools::ToolRegistry;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub sentinel: String,
    pub next_move_message: String,
    pub success_policy: SuccessPolicy,
}

impl LoopSettings {
    pub fn from_config(run: &RunConfig) -> Self {
        Self {
            max_iterations: run.max_iterations,
            sentinel: run.sentinel.clone(),
            next_move_message: run.next_move_message.clone(),
            success_policy: SuccessPolicy::from_config(run),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            sentinel: DEFAULT_SENTINEL.to_string(),
            next_move_message: DEFAULT_NEXT_MOVE.to_string(),
            success_policy: SuccessPolicy::SentinelOnly,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Not a single iteration managed to open a session.
    #[error("engine unavailable after {iteration} iteration(s): {last_error}")]
    EngineUnavailable { iteration: u32, last_error: String },
}

/// How a single iteration went, as seen by the loop.
#[derive(Debug)]
pub enum IterationResult {
    Completed(TurnReport),
    OpenFailed(EngineError),
}

pub struct SessionOrchestrator {
    goal: PromptSource,
    skill: PromptSource,
    state: Arc<StateStore>,
    tools: Arc<ToolRegistry>,
    engine: Arc<dyn Engine>,
    settings: LoopSettings,
    processor: TurnEventProcessor,
}

impl SessionOrchestrator {
    pub fn new(
        goal: PromptSource,
        skill: PromptSource,
        state: Arc<StateStore>,
        tools: Arc<ToolRegistry>,
        engine: Arc<dyn Engine>,
        settings: LoopSettings,
    ) -> Self {
        let processor =
            TurnEventProcessor::new(settings.sentinel.clone(), settings.success_policy.clone());
        Self {
            goal,
            skill,
            state,
            tools,
            engine,
            settings,
            processor,
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// The system prompt the next iteration would use.
    pub async fn render_prompt(&self) -> String {
        let goal = self.goal.load().await;
        let skill = self.skill.load().await;
        let state_json = self.state.snapshot().await.to_pretty_json();
        build_system_prompt(&goal, &skill, &state_json, &self.settings.sentinel)
    }

    pub async fn run(&self) -> Result<RunReport, RunError> {
        let mut counter = IterationCounter::new(self.settings.max_iterations);
        let mut aborted_turns = 0;
        let mut opened_any = false;
        let mut last_open_error = None;

        info!(
            "starting loop: max {} iteration(s), {} tool(s)",
            counter.max(),
            self.tools.len()
        );

        while let Some(iteration) = counter.advance() {
            info!("iteration {}/{}", iteration, counter.max());

            match self.run_iteration(iteration).await {
                IterationResult::OpenFailed(e) => {
                    warn!("iteration {}: could not open session: {}", iteration, e);
                    aborted_turns += 1;
                    last_open_error = Some(e.to_string());
                }
                IterationResult::Completed(report) => {
                    opened_any = true;
                    info!(
                        "iteration {} {} ({} message(s), {} tool call(s), {} tool error(s))",
                        iteration,
                        report.outcome,
                        report.trace.assistant_messages,
                        report.trace.tools.len(),
                        report.trace.tool_errors()
                    );
                    match report.outcome {
                        SessionTurnOutcome::Succeeded => {
                            info!("goal complete after {} iteration(s)", iteration);
                            return Ok(RunReport {
                                status: TerminalStatus::Succeeded,
                                iterations: iteration,
                                aborted_turns,
                            });
                        }
                        SessionTurnOutcome::Aborted { .. } => aborted_turns += 1,
                        SessionTurnOutcome::Continue => {}
                    }
                }
            }
        }

        if !opened_any {
            let last_error = last_open_error.unwrap_or_else(|| "unknown error".to_string());
            error!(
                "no session could be opened in {} iteration(s); last error: {}",
                counter.current(),
                last_error
            );
            return Err(RunError::EngineUnavailable {
                iteration: counter.current(),
                last_error,
            });
        }

        info!(
            "iteration budget exhausted after {} iteration(s)",
            counter.current()
        );
        Ok(RunReport {
            status: TerminalStatus::Exhausted,
            iterations: counter.current(),
            aborted_turns,
        })
    }

    /// One create-session → prompt → drain → close cycle.
    pub async fn run_iteration(&self, iteration: u32) -> IterationResult {
        let prompt = self.render_prompt().await;
        let config = SessionConfig::fresh(prompt, self.tools.clone());
        let session_id = config.session_id.clone();

        let mut session = match self.engine.open_session(config).await {
            Ok(s) => s,
            Err(e) => return IterationResult::OpenFailed(e),
        };
        info!("iteration {}: session {}", iteration, session_id);

        let report = match session.send(&self.settings.next_move_message).await {
            Ok(stream) => self.processor.drain_traced(stream).await,
            Err(e) => TurnReport {
                outcome: SessionTurnOutcome::aborted(format!("send failed: {}", e)),
                trace: Default::default(),
            },
        };

        session.close().await;
        IterationResult::Completed(report)
    }
}
