//! MCP wire types (JSON-RPC 2.0, newline-delimited)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: i64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response or notification
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub id: Option<i64>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
    /// Set for notifications (server → client)
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Tool definition returned by tools/list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerToolDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Content blocks returned by tools/call
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        uri: String,
        #[serde(default)]
        text: Option<String>,
    },
}

impl std::fmt::Display for ServerContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerContent::Text { text } => write!(f, "{text}"),
            ServerContent::Image { mime_type, .. } => write!(f, "[image: {mime_type}]"),
            ServerContent::Resource { uri, text } => match text {
                Some(t) => write!(f, "{uri}\n{t}"),
                None => write!(f, "{uri}"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<ServerToolDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub content: Vec<ServerContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Concatenate content blocks into one display string.
    pub fn rendered(&self) -> String {
        self.content
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

#[derive(Debug, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_serialize_with_jsonrpc_marker() {
        let req = RpcRequest::new(7, "tools/list", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert!(json.get("params").is_none());
    }

    #[test]
    fn tool_defs_read_camel_case_schema_key() {
        let def: ServerToolDef = serde_json::from_value(json!({
            "name": "read_file",
            "inputSchema": {"type": "object"}
        }))
        .unwrap();
        assert_eq!(def.name, "read_file");
        assert!(def.description.is_none());
    }

    #[test]
    fn call_results_render_mixed_content() {
        let result: ToolCallResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "resource", "uri": "file:///a", "text": "body"}
            ]
        }))
        .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.rendered(), "hello\nfile:///a\nbody");
    }
}
