//! JSON-RPC 2.0 messages and the MCP payloads carried in them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use toolchat_model::ModelTool;

use crate::McpError;

/// The MCP revision this client speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// A request without an id; the server never answers it.
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> JsonRpcNotification<'a> {
    pub fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// Any message from the server. Requests and notifications sent by the
/// server carry a `method` and are ignored by this client.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Returns `true` if this is the response to request `id`.
    pub fn answers(&self, id: u64) -> bool {
        self.method.is_none()
            && self.id.as_ref().and_then(Value::as_u64) == Some(id)
    }

    pub fn into_result(self) -> Result<Value, McpError> {
        match self.error {
            Some(err) => Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: &'static str,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            capabilities: json!({}),
            client_info: ClientInfo {
                name: env!("CARGO_PKG_NAME"),
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClientInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// A page of `tools/list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A tool as advertised by a server.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    json!({ "type": "object" })
}

impl From<ToolDefinition> for ModelTool {
    fn from(tool: ToolDefinition) -> Self {
        ModelTool {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            parameters: tool.input_schema,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CallToolParams<'a> {
    pub name: &'a str,
    pub arguments: Map<String, Value>,
}

/// The result of `tools/call`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Reduces the result to a single JSON value.
    ///
    /// Structured content is returned as is. Otherwise a single text part
    /// is parsed as JSON when it can be, and several text parts are joined
    /// into one string. Content without any text is returned raw.
    pub fn into_value(self) -> Result<Value, McpError> {
        let texts: Vec<&str> = self
            .content
            .iter()
            .filter(|part| part["type"] == "text")
            .filter_map(|part| part["text"].as_str())
            .collect();

        if self.is_error {
            let message = if texts.is_empty() {
                "the tool reported an error".to_owned()
            } else {
                texts.join("\n")
            };
            return Err(McpError::ToolFailed(message));
        }
        if let Some(structured) = self.structured_content {
            return Ok(structured);
        }

        match texts.as_slice() {
            [] => Ok(Value::Array(self.content)),
            [text] => Ok(serde_json::from_str(text)
                .unwrap_or_else(|_| Value::String((*text).to_owned()))),
            texts => Ok(Value::String(texts.join("\n"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_result(json: &str) -> CallToolResult {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new(7, "tools/list", None);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "jsonrpc": "2.0", "id": 7, "method": "tools/list" })
        );

        let note = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_initialize_params() {
        let json = serde_json::to_value(InitializeParams::default()).unwrap();
        assert_eq!(json["protocolVersion"], "2024-11-05");
        assert_eq!(json["clientInfo"]["name"], "toolchat-mcp");
        assert!(json["capabilities"].is_object());
    }

    #[test]
    fn test_response_matching() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#,
        )
        .unwrap();
        assert!(resp.answers(3));
        assert!(!resp.answers(4));

        // A server-initiated ping reuses the id space but isn't an answer.
        let ping: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
        )
        .unwrap();
        assert!(!ping.answers(3));
    }

    #[test]
    fn test_rpc_error() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.to_string(), "JSON-RPC error -32601: Method not found");
    }

    #[test]
    fn test_tool_definition() {
        let tool: ToolDefinition = serde_json::from_str(
            r#"{"name":"duckduckgo_search","description":"Search the web","inputSchema":{"type":"object","properties":{"query":{"type":"string"}}}}"#,
        )
        .unwrap();
        let tool = ModelTool::from(tool);
        assert_eq!(tool.name, "duckduckgo_search");
        assert_eq!(tool.parameters["properties"]["query"]["type"], "string");

        let bare: ToolDefinition =
            serde_json::from_str(r#"{"name":"now"}"#).unwrap();
        let bare = ModelTool::from(bare);
        assert_eq!(bare.description, "");
        assert_eq!(bare.parameters, json!({ "type": "object" }));
    }

    #[test]
    fn test_single_text_part() {
        let result = call_result(
            r#"{"content":[{"type":"text","text":"{\"temp_c\": 18}"}]}"#,
        );
        assert_eq!(result.into_value().unwrap(), json!({ "temp_c": 18 }));

        let result =
            call_result(r#"{"content":[{"type":"text","text":"sunny"}]}"#);
        assert_eq!(result.into_value().unwrap(), json!("sunny"));
    }

    #[test]
    fn test_several_text_parts() {
        let result = call_result(
            r#"{"content":[
                {"type":"text","text":"1. Rust"},
                {"type":"image","data":"...","mimeType":"image/png"},
                {"type":"text","text":"2. Tokio"}
            ]}"#,
        );
        assert_eq!(result.into_value().unwrap(), json!("1. Rust\n2. Tokio"));
    }

    #[test]
    fn test_structured_content_wins() {
        let result = call_result(
            r#"{"content":[{"type":"text","text":"18 degrees"}],"structuredContent":{"temp_c":18}}"#,
        );
        assert_eq!(result.into_value().unwrap(), json!({ "temp_c": 18 }));
    }

    #[test]
    fn test_error_result() {
        let result = call_result(
            r#"{"content":[{"type":"text","text":"rate limited"}],"isError":true}"#,
        );
        let err = result.into_value().unwrap_err();
        assert!(matches!(err, McpError::ToolFailed(ref msg) if msg == "rate limited"));
    }
}
