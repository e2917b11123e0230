//! Loop-level value types shared by the orchestrator and its callers

use std::fmt;

/// Result of one iteration. Recomputed every turn, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionTurnOutcome {
    /// Turn went idle without the sentinel; budget decides what happens next.
    Continue,
    /// The sentinel was observed before the turn went idle.
    Succeeded,
    /// The session or its transport failed. Counts against the budget.
    Aborted { reason: String },
}

impl SessionTurnOutcome {
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

impl fmt::Display for SessionTurnOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Aborted { reason } => write!(f, "aborted ({})", reason),
        }
    }
}

/// How a whole run ended. Exhaustion is a normal terminal state, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalStatus {
    Succeeded,
    Exhausted,
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Summary handed back to the operator once the loop stops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub status: TerminalStatus,
    /// Iterations actually performed (1..=max).
    pub iterations: u32,
    pub aborted_turns: u32,
}

/// Bounded, monotonically increasing iteration counter.
///
/// Starts at zero; `advance` yields 1, 2, ... up to and including `max`,
/// then refuses to go further.
#[derive(Clone, Copy, Debug)]
pub struct IterationCounter {
    current: u32,
    max: u32,
}

impl IterationCounter {
    /// `max` is clamped to at least 1 so a started loop always runs once.
    pub fn new(max: u32) -> Self {
        Self {
            current: 0,
            max: max.max(1),
        }
    }

    pub fn advance(&mut self) -> Option<u32> {
        if self.current >= self.max {
            return None;
        }
        self.current += 1;
        Some(self.current)
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.current >= self.max
    }
}
