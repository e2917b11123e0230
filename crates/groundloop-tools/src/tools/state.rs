//! State tools — inspect and update the durable record

use crate::registry::{required_str, Tool, ToolResult};
use groundloop_core::StateStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Keys owned by the typed fields; status updates may not shadow them.
const RESERVED_KEYS: &[&str] = &[
    "credential",
    "identity",
    "activation-url",
    "last-action-timestamp",
];

pub struct InspectStateTool {
    state: Arc<StateStore>,
}

impl InspectStateTool {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl Tool for InspectStateTool {
    fn name(&self) -> &str {
        "inspect_state"
    }

    fn description(&self) -> &str {
        "Show the current durable state (credential, identity, activation URL, \
         last action time and any status fields) as JSON."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        ToolResult::text(self.state.snapshot().await.to_pretty_json())
    }
}

pub struct SaveCredentialTool {
    state: Arc<StateStore>,
}

impl SaveCredentialTool {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl Tool for SaveCredentialTool {
    fn name(&self) -> &str {
        "save_credential"
    }

    fn description(&self) -> &str {
        "Store a credential (API key or token) in durable state. \
         It is sent as a bearer token on later service calls."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "value": { "type": "string", "description": "The credential to store" }
            },
            "required": ["value"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let value = match required_str(&args, "value") {
            Ok(v) => v.trim().to_string(),
            Err(e) => return e,
        };
        if value.is_empty() {
            return ToolResult::error("Credential must not be empty");
        }

        match self.state.mutate(|s| s.credential = Some(value)).await {
            Ok(()) => {
                debug!("credential saved");
                ToolResult::text("Credential saved.")
            }
            Err(e) => ToolResult::error(format!("Failed to persist credential: {}", e)),
        }
    }
}

pub struct SetStatusTool {
    state: Arc<StateStore>,
}

impl SetStatusTool {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl Tool for SetStatusTool {
    fn name(&self) -> &str {
        "set_status"
    }

    fn description(&self) -> &str {
        "Record a free-form status field in durable state so later turns can see \
         progress. Pass null to clear a field."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "Status field name" },
                "value": { "description": "Any JSON value; null removes the field" }
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let key = match required_str(&args, "key") {
            Ok(k) => k.trim().to_string(),
            Err(e) => return e,
        };
        if key.is_empty() || RESERVED_KEYS.contains(&key.as_str()) {
            return ToolResult::error(format!("'{}' cannot be used as a status key", key));
        }
        let value = args.get("value").cloned().unwrap_or(Value::Null);

        let result = self
            .state
            .mutate(|s| {
                if value.is_null() {
                    s.extra.remove(&key);
                } else {
                    s.set_status(key.clone(), value);
                }
            })
            .await;

        match result {
            Ok(()) => ToolResult::text(format!("Status '{}' updated.", key)),
            Err(e) => ToolResult::error(format!("Failed to persist status: {}", e)),
        }
    }
}
