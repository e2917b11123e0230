//! Remote service tools — browse, search, post and comment

use crate::registry::{required_str, truncate, Tool, ToolResult};
use crate::service::{ServiceClient, ServiceResponse};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_BODY: usize = 20_000;
const DEFAULT_LIMIT: u64 = 25;

fn limit_arg(args: &Value) -> String {
    args.get("limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, 100)
        .to_string()
}

/// Render a response body for the engine. Non-2xx statuses are reported but
/// still returned as text so the engine can read the service's explanation.
fn body_result(response: ServiceResponse) -> ToolResult {
    if response.is_success() {
        if response.body.trim().is_empty() {
            ToolResult::text(format!("HTTP {} (empty body)", response.status))
        } else {
            ToolResult::text(truncate(&response.body, MAX_BODY))
        }
    } else {
        ToolResult::error(format!(
            "HTTP {}: {}",
            response.status,
            truncate(&response.body, MAX_BODY)
        ))
    }
}

/// Stamp `last-action-timestamp` after a successful write action.
async fn record_action(service: &ServiceClient, response: ServiceResponse) -> ToolResult {
    if !response.is_success() {
        warn!("service action rejected: HTTP {}", response.status);
        return body_result(response);
    }
    if let Err(e) = service.state().mutate(|s| s.touch()).await {
        return ToolResult::error(format!(
            "Action succeeded (HTTP {}) but state could not be saved: {}",
            response.status, e
        ));
    }
    body_result(response)
}

pub struct ListItemsTool {
    service: Arc<ServiceClient>,
}

impl ListItemsTool {
    pub fn new(service: Arc<ServiceClient>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Tool for ListItemsTool {
    fn name(&self) -> &str {
        "list_items"
    }

    fn description(&self) -> &str {
        "List recent items from the remote service. Returns the raw response body."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sort": { "type": "string", "description": "Sort order, e.g. 'new' or 'top'" },
                "limit": { "type": "integer", "description": "Maximum items (default 25, max 100)" }
            }
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let mut query = vec![("limit", limit_arg(&args))];
        if let Some(sort) = args.get("sort").and_then(|v| v.as_str()) {
            query.push(("sort", sort.to_string()));
        }

        match self.service.get(&self.service.endpoints().list_path, &query).await {
            Ok(response) => body_result(response),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct SearchTool {
    service: Arc<ServiceClient>,
}

impl SearchTool {
    pub fn new(service: Arc<ServiceClient>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the remote service. Returns the raw response body."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search terms" },
                "limit": { "type": "integer", "description": "Maximum results (default 25, max 100)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let query = match required_str(&args, "query") {
            Ok(q) => q.to_string(),
            Err(e) => return e,
        };
        let params = [("q", query), ("limit", limit_arg(&args))];

        match self.service.get(&self.service.endpoints().search_path, &params).await {
            Ok(response) => body_result(response),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct CreatePostTool {
    service: Arc<ServiceClient>,
}

impl CreatePostTool {
    pub fn new(service: Arc<ServiceClient>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Tool for CreatePostTool {
    fn name(&self) -> &str {
        "create_post"
    }

    fn description(&self) -> &str {
        "Publish a new post on the remote service. Requires a saved credential."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Post title" },
                "content": { "type": "string", "description": "Post body" },
                "channel": { "type": "string", "description": "Optional channel or community" }
            },
            "required": ["title", "content"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let title = match required_str(&args, "title") {
            Ok(t) => t,
            Err(e) => return e,
        };
        let content = match required_str(&args, "content") {
            Ok(c) => c,
            Err(e) => return e,
        };

        let mut body = json!({ "title": title, "content": content });
        if let Some(channel) = args.get("channel").and_then(|v| v.as_str()) {
            body["channel"] = Value::String(channel.to_string());
        }

        debug!("create_post: {}", truncate(title, 80));
        match self.service.post(&self.service.endpoints().create_path, &body).await {
            Ok(response) => record_action(&self.service, response).await,
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct AddCommentTool {
    service: Arc<ServiceClient>,
}

impl AddCommentTool {
    pub fn new(service: Arc<ServiceClient>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Tool for AddCommentTool {
    fn name(&self) -> &str {
        "add_comment"
    }

    fn description(&self) -> &str {
        "Comment on an existing post. Requires a saved credential."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "post_id": { "type": "string", "description": "Identifier of the post" },
                "content": { "type": "string", "description": "Comment text" }
            },
            "required": ["post_id", "content"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let post_id = match args.get("post_id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return ToolResult::error("Missing required parameter: post_id"),
        };
        let content = match required_str(&args, "content") {
            Ok(c) => c,
            Err(e) => return e,
        };

        if post_id == "." || post_id == ".." {
            return ToolResult::error(format!("Invalid post_id: {}", post_id));
        }

        // One path segment: separators and other reserved bytes are escaped.
        let path = self
            .service
            .endpoints()
            .comment_path
            .replace("{post_id}", &urlencoding::encode(&post_id));
        match self.service.post(&path, &json!({ "content": content })).await {
            Ok(response) => record_action(&self.service, response).await,
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
