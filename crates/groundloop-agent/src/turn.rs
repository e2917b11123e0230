//! Turn event processing — fold one session's events into a turn outcome.
//!
//! The event stream is consumed by its own task. Every event is fed through
//! [`TurnState::apply`]; the first terminal outcome resolves a single-shot
//! signal that the iteration awaits. Later resolutions (a duplicate idle, an
//! error arriving after idle) are ignored.

use crate::engine::{SessionEvent, SessionEventStream};
use futures::StreamExt;
use groundloop_core::config::{RunConfig, SuccessPolicyKind};
use groundloop_core::SessionTurnOutcome;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub const STREAM_CLOSED_REASON: &str = "event stream closed before idle";

/// What counts as goal completion within a turn.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SuccessPolicy {
    /// Only the sentinel in assistant output.
    #[default]
    SentinelOnly,
    /// The sentinel, or a successful result from `tool` containing `marker`.
    SentinelOrToolEvidence { tool: String, marker: String },
}

impl SuccessPolicy {
    pub fn from_config(run: &RunConfig) -> Self {
        match (run.success_policy, &run.evidence_tool, &run.evidence_marker) {
            (SuccessPolicyKind::ToolEvidence, Some(tool), Some(marker)) => {
                Self::SentinelOrToolEvidence {
                    tool: tool.clone(),
                    marker: marker.clone(),
                }
            }
            (SuccessPolicyKind::ToolEvidence, _, _) => {
                warn!("tool-evidence policy without tool/marker; using sentinel only");
                Self::SentinelOnly
            }
            (SuccessPolicyKind::SentinelOnly, _, _) => Self::SentinelOnly,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolTraceEntry {
    pub name: String,
    pub is_error: bool,
}

/// Per-turn record of what happened, for logging and tests.
#[derive(Clone, Debug, Default)]
pub struct TurnTrace {
    pub assistant_messages: usize,
    pub tools_started: usize,
    pub tools: Vec<ToolTraceEntry>,
    pub sentinel_seen: bool,
}

impl TurnTrace {
    pub fn tool_errors(&self) -> usize {
        self.tools.iter().filter(|t| t.is_error).count()
    }
}

/// Reducer over session events.
#[derive(Debug)]
pub struct TurnState {
    sentinel: String,
    policy: SuccessPolicy,
    evidence_seen: bool,
    trace: TurnTrace,
}

impl TurnState {
    pub fn new(sentinel: impl Into<String>, policy: SuccessPolicy) -> Self {
        Self {
            sentinel: sentinel.into(),
            policy,
            evidence_seen: false,
            trace: TurnTrace::default(),
        }
    }

    /// Apply one event. Returns the outcome when the event is terminal.
    pub fn apply(&mut self, event: &SessionEvent) -> Option<SessionTurnOutcome> {
        match event {
            SessionEvent::AssistantMessage { content } => {
                self.trace.assistant_messages += 1;
                if !self.sentinel.is_empty() && content.contains(&self.sentinel) {
                    self.trace.sentinel_seen = true;
                }
                None
            }
            SessionEvent::ToolExecutionStart { .. } => {
                self.trace.tools_started += 1;
                None
            }
            SessionEvent::ToolExecutionComplete {
                name,
                result,
                is_error,
                ..
            } => {
                self.trace.tools.push(ToolTraceEntry {
                    name: name.clone(),
                    is_error: *is_error,
                });
                if let SuccessPolicy::SentinelOrToolEvidence { tool, marker } = &self.policy {
                    if !is_error && name == tool && result.contains(marker.as_str()) {
                        self.evidence_seen = true;
                    }
                }
                None
            }
            SessionEvent::SessionIdle => {
                if self.trace.sentinel_seen || self.evidence_seen {
                    Some(SessionTurnOutcome::Succeeded)
                } else {
                    Some(SessionTurnOutcome::Continue)
                }
            }
            SessionEvent::SessionError { message } => {
                Some(SessionTurnOutcome::aborted(message.clone()))
            }
        }
    }

    pub fn trace(&self) -> &TurnTrace {
        &self.trace
    }
}

/// Single-shot completion signal. Only the first `resolve` is delivered.
pub struct Resolution {
    tx: Mutex<Option<oneshot::Sender<SessionTurnOutcome>>>,
}

impl Resolution {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<SessionTurnOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Returns `false` when the signal was already resolved.
    pub fn resolve(&self, outcome: SessionTurnOutcome) -> bool {
        let sender = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        match self.tx.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TurnReport {
    pub outcome: SessionTurnOutcome,
    pub trace: TurnTrace,
}

#[derive(Clone, Debug)]
pub struct TurnEventProcessor {
    sentinel: String,
    policy: SuccessPolicy,
}

impl TurnEventProcessor {
    pub fn new(sentinel: impl Into<String>, policy: SuccessPolicy) -> Self {
        Self {
            sentinel: sentinel.into(),
            policy,
        }
    }

    pub async fn drain(&self, stream: SessionEventStream) -> SessionTurnOutcome {
        self.drain_traced(stream).await.outcome
    }

    /// Consume `stream` on a subscriber task and wait for the first outcome.
    pub async fn drain_traced(&self, stream: SessionEventStream) -> TurnReport {
        let (signal, rx) = Resolution::new();
        let state = Arc::new(Mutex::new(TurnState::new(
            self.sentinel.clone(),
            self.policy.clone(),
        )));

        let task_state = state.clone();
        let task_signal = signal.clone();
        tokio::spawn(async move {
            let mut stream = stream;
            while let Some(event) = stream.next().await {
                log_event(&event);
                let outcome = match task_state.lock() {
                    Ok(mut s) => s.apply(&event),
                    Err(poisoned) => poisoned.into_inner().apply(&event),
                };
                if let Some(outcome) = outcome {
                    if !task_signal.resolve(outcome.clone()) {
                        debug!("turn already resolved; ignoring late {}", outcome);
                    }
                }
            }
            task_signal.resolve(SessionTurnOutcome::aborted(STREAM_CLOSED_REASON));
        });

        let outcome = rx
            .await
            .unwrap_or_else(|_| SessionTurnOutcome::aborted("event subscriber failed"));
        let trace = match state.lock() {
            Ok(s) => s.trace().clone(),
            Err(poisoned) => poisoned.into_inner().trace().clone(),
        };
        TurnReport { outcome, trace }
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::AssistantMessage { content } => {
            debug!("assistant: {}", preview(content));
        }
        SessionEvent::ToolExecutionStart { id, name } => {
            debug!("tool start: {} ({})", name, id);
        }
        SessionEvent::ToolExecutionComplete {
            name,
            is_error,
            result,
            ..
        } => {
            debug!(
                "tool done: {}{} {}",
                name,
                if *is_error { " [error]" } else { "" },
                preview(result)
            );
        }
        SessionEvent::SessionIdle => debug!("session idle"),
        SessionEvent::SessionError { message } => warn!("session error: {}", message),
    }
}

fn preview(text: &str) -> String {
    let one_line = text.replace('\n', " ");
    match one_line.char_indices().nth(160) {
        Some((i, _)) => format!("{}…", &one_line[..i]),
        None => one_line,
    }
}
