use serde::{Deserialize, Serialize};
use toolchat_model::ToolCallRequest;

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
}

/// What the fake model answers to one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetResponse {
    /// Stream these events, then complete.
    Events(Vec<PresetEvent>),
    /// Reject the request with this message.
    Failure(String),
}

impl PresetResponse {
    /// A response made of a single text delta.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Events(vec![PresetEvent::MessageDelta(text.into())])
    }

    /// A response made of the given events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self::Events(events.into())
    }

    /// A failing response.
    #[inline]
    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self::Failure(message.into())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialized_shape() {
        let response = PresetResponse::with_events([PresetEvent::ToolCall(
            ToolCallRequest {
                id: "call_1".to_owned(),
                name: "duckduckgo_search".to_owned(),
                arguments: json!({ "query": "weather in Paris" }),
            },
        )]);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["Events"][0]["type"], "tool_call");
        assert_eq!(value["Events"][0]["data"]["name"], "duckduckgo_search");

        let back: PresetResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back, response);
    }
}
