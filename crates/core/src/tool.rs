//! The seam between the agent and whatever executes tools.

mod error;

use async_trait::async_trait;
use serde_json::{Map, Value};
use toolchat_model::ModelTool;

pub use error::{Error, ErrorKind};

/// Named arguments of a tool call.
pub type ToolArguments = Map<String, Value>;

/// The result of a tool call.
pub type ToolResult = Result<Value, Error>;

/// A client for a set of tool servers.
///
/// Implementations own their connections. After
/// [`close_all_sessions`](ToolClient::close_all_sessions) returns, further
/// calls are expected to fail.
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Returns every tool the client can call.
    async fn list_tools(&self) -> Result<Vec<ModelTool>, Error>;

    /// Calls the tool named `name`.
    async fn call_tool(
        &self,
        name: &str,
        arguments: ToolArguments,
    ) -> ToolResult;

    /// Releases all sessions and connections.
    async fn close_all_sessions(&self) -> Result<(), Error>;
}

/// Converts model-provided arguments into [`ToolArguments`].
///
/// `null` means no arguments; anything else that is not an object is
/// rejected.
pub fn arguments_from_value(value: Value) -> Result<ToolArguments, Error> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(Error::invalid_input().with_reason(format!(
            "tool arguments must be a JSON object, got `{other}`"
        ))),
    }
}

/// Renders a tool result as the text the model reads. Strings are passed
/// through; everything else is compact JSON.
pub fn result_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_arguments_from_value() {
        let args = arguments_from_value(json!({ "query": "rust" })).unwrap();
        assert_eq!(args["query"], "rust");
        assert!(arguments_from_value(Value::Null).unwrap().is_empty());

        let err = arguments_from_value(json!("query=rust")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.reason().contains("JSON object"));
    }

    #[test]
    fn test_result_to_text() {
        assert_eq!(result_to_text(&json!("plain")), "plain");
        assert_eq!(result_to_text(&json!({ "a": [1, 2] })), r#"{"a":[1,2]}"#);
    }
}
