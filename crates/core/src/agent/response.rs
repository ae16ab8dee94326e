use serde_json::{Map, Value};
use toolchat_model::ToolCallRequest;

use super::AgentError;
use crate::tool::{self, ToolArguments};

/// The outcome of [`Agent::run`](super::Agent::run).
#[derive(Clone, Debug, PartialEq)]
pub enum AgentResponse {
    /// Text to show to the user.
    FinalAnswer(String),
    /// A tool the caller should call on the agent's behalf.
    ToolRequest {
        /// The tool name.
        name: String,
        /// The tool arguments.
        arguments: ToolArguments,
    },
}

impl AgentResponse {
    /// Interprets the model's final text.
    ///
    /// Some models answer with a bare `{"tool": ..., "arguments": ...}`
    /// object instead of a native tool call. Such text, optionally inside a
    /// Markdown code fence, becomes a [`ToolRequest`](Self::ToolRequest).
    pub(crate) fn from_text(text: String) -> Result<Self, AgentError> {
        let Some(mut object) = parse_object(&text) else {
            return Ok(Self::FinalAnswer(text));
        };
        let Some(Value::String(name)) = object.remove("tool") else {
            return Ok(Self::FinalAnswer(text));
        };
        let arguments = object.remove("arguments").unwrap_or(Value::Null);
        Self::tool_request(name, arguments)
    }

    pub(crate) fn from_tool_call(
        call: ToolCallRequest,
    ) -> Result<Self, AgentError> {
        Self::tool_request(call.name, call.arguments)
    }

    fn tool_request(name: String, arguments: Value) -> Result<Self, AgentError> {
        let arguments = tool::arguments_from_value(arguments).map_err(|err| {
            AgentError::MalformedToolRequest(format!("{name}: {err}"))
        })?;
        debug!("model requested tool {name} from the caller");
        Ok(Self::ToolRequest { name, arguments })
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    let body = strip_code_fence(text.trim());
    if !body.starts_with('{') {
        return None;
    }
    match serde_json::from_str(body) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Returns the body of a fenced code block, or `text` if it isn't one.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string, e.g. "json".
    match rest.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => rest.trim(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_plain_text() {
        let resp = AgentResponse::from_text("Hello there.".to_owned()).unwrap();
        assert_eq!(resp, AgentResponse::FinalAnswer("Hello there.".to_owned()));

        // JSON that isn't a tool request is still an answer.
        let text = r#"{"temperature": 18}"#.to_owned();
        let resp = AgentResponse::from_text(text.clone()).unwrap();
        assert_eq!(resp, AgentResponse::FinalAnswer(text));
    }

    #[test]
    fn test_raw_tool_request() {
        let text = r#"{"tool": "get_weather", "arguments": {"city": "Oslo"}}"#;
        let resp = AgentResponse::from_text(text.to_owned()).unwrap();
        let AgentResponse::ToolRequest { name, arguments } = resp else {
            panic!("expected a tool request, got {resp:?}");
        };
        assert_eq!(name, "get_weather");
        assert_eq!(arguments["city"], "Oslo");
    }

    #[test]
    fn test_fenced_tool_request() {
        let text = "```json\n{\"tool\": \"list_files\"}\n```";
        let resp = AgentResponse::from_text(text.to_owned()).unwrap();
        assert_eq!(
            resp,
            AgentResponse::ToolRequest {
                name: "list_files".to_owned(),
                arguments: Map::new(),
            }
        );
    }

    #[test]
    fn test_malformed_arguments() {
        let text = r#"{"tool": "get_weather", "arguments": "Oslo"}"#;
        let err = AgentResponse::from_text(text.to_owned()).unwrap_err();
        assert!(matches!(err, AgentError::MalformedToolRequest(_)));
        assert!(err.to_string().contains("get_weather"));
    }

    #[test]
    fn test_from_tool_call() {
        let resp = AgentResponse::from_tool_call(ToolCallRequest {
            id: "call_1".to_owned(),
            name: "search".to_owned(),
            arguments: json!({ "query": "rust" }),
        })
        .unwrap();
        assert!(matches!(
            resp,
            AgentResponse::ToolRequest { ref name, ref arguments }
                if name == "search" && arguments["query"] == "rust"
        ));

        let err = AgentResponse::from_tool_call(ToolCallRequest {
            id: "call_2".to_owned(),
            name: "search".to_owned(),
            arguments: json!("{not json"),
        })
        .unwrap_err();
        assert!(matches!(err, AgentError::MalformedToolRequest(_)));
    }
}
