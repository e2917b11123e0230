//! JSON-RPC 2.0 message shapes spoken with a remote tool provider

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: i64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Any inbound line. Responses carry an `id` and one of `result`/`error`;
/// requests and notifications from the provider carry `method` and are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

impl InboundMessage {
    /// Numeric id of a response, or `None` for anything that is not one.
    pub fn response_id(&self) -> Option<i64> {
        if self.method.is_some() {
            return None;
        }
        self.id.as_ref().and_then(|id| match id {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    }
}

pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": { "name": "groundloop", "version": env!("CARGO_PKG_VERSION") }
    })
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// Some providers advertise bare parameter names instead of a schema.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

impl RemoteToolDescriptor {
    /// The advertised schema, or one synthesised from parameter names as
    /// string properties.
    pub fn schema(&self) -> Value {
        if let Some(schema) = self.input_schema.as_ref().filter(|s| s.is_object()) {
            return schema.clone();
        }
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.clone(), json!({ "type": "string" })))
            .collect();
        json!({ "type": "object", "properties": properties })
    }

    pub fn parameter_names(&self) -> Vec<String> {
        match self
            .input_schema
            .as_ref()
            .and_then(|s| s.get("properties"))
            .and_then(|p| p.as_object())
        {
            Some(props) => props.keys().cloned().collect(),
            None => self.parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<RemoteToolDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|c| match c {
            ContentItem::Text { text } => Some(text.as_str()),
            ContentItem::Other => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_version() {
        let req = JsonRpcRequest::new(7, "tools/list", None);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}));
    }

    #[test]
    fn inbound_response_vs_request() {
        let resp: InboundMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":{}}"#).unwrap();
        assert_eq!(resp.response_id(), Some(3));

        let req: InboundMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#).unwrap();
        assert_eq!(req.response_id(), None);
    }

    #[test]
    fn schema_synthesised_from_parameter_names() {
        let d: RemoteToolDescriptor =
            serde_json::from_value(json!({"name": "echo", "parameters": ["text"]})).unwrap();
        assert_eq!(
            d.schema(),
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        );
        assert_eq!(d.parameter_names(), vec!["text".to_string()]);
    }

    #[test]
    fn call_result_first_text() {
        let r: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "image", "data": "…"}, {"type": "text", "text": "hi"}],
            "isError": false
        }))
        .unwrap();
        assert_eq!(r.first_text(), Some("hi"));
        assert!(CallToolResult::default().first_text().is_none());
    }
}
