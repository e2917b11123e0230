//! Per-iteration system prompt assembly

use std::path::PathBuf;
use tracing::debug;

pub const NOT_PROVIDED: &str = "(not provided)";

/// Goal or skill text: given inline, or read from a file every iteration so
/// edits between iterations are picked up.
#[derive(Clone, Debug)]
pub enum PromptSource {
    Text(String),
    File(PathBuf),
}

impl PromptSource {
    /// The text verbatim; the placeholder only when a file cannot be read.
    pub async fn load(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::File(path) => match tokio::fs::read_to_string(path).await {
                Ok(text) => text,
                Err(e) => {
                    debug!("{} unreadable ({}); using placeholder", path.display(), e);
                    NOT_PROVIDED.to_string()
                }
            },
        }
    }
}

impl From<&str> for PromptSource {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<PathBuf> for PromptSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Fixed instruction template wrapped around the three variable parts.
pub fn build_system_prompt(goal: &str, skill: &str, state_json: &str, sentinel: &str) -> String {
    format!(
        "You are an autonomous agent working toward a goal across several short sessions. \
This session starts with no memory of earlier ones; the durable state below is \
everything that carried over.

## Goal
{goal}

## Skill reference
{skill}

## Durable state
```json
{state_json}
```

## How to work
1. Inspect the durable state first (the `inspect_state` tool shows the latest copy).
2. If setup is missing (for example there is no credential yet), perform it now: \
register, then save what you were issued.
3. Otherwise take the next concrete action toward the goal using the tools available.
4. Record anything a later session needs in durable state; nothing else is remembered.
5. When the goal is fully achieved, reply with the exact token {sentinel} on its own line. \
Do not write that token for any other reason.
"
    )
}
