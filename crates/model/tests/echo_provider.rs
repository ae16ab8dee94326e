use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::{poll_fn, ready};
use std::pin::Pin;
use std::task::{self, Poll};

use serde_json::json;
use toolchat_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    ModelTool, Role, ToolCallRequest,
};

#[derive(Debug)]
struct EchoError(ErrorKind);

impl Display for EchoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "echo failed: {}", self.0)
    }
}

impl Error for EchoError {}

impl ModelProviderError for EchoError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

struct EchoResponse {
    events: VecDeque<ModelResponseEvent>,
}

impl ModelResponse for EchoResponse {
    type Error = EchoError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        Poll::Ready(Ok(self.get_mut().events.pop_front()))
    }
}

/// Echoes the last user message word by word. A message starting with
/// `/` becomes a call to the tool of that name, if it is offered.
struct EchoProvider;

impl ModelProvider for EchoProvider {
    type Error = EchoError;
    type Response = EchoResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|msg| msg.role() == Role::User)
            .and_then(ModelMessage::text);
        let Some(text) = last_user else {
            return ready(Err(EchoError(ErrorKind::Other)));
        };

        let mut events = VecDeque::new();
        let tool = text
            .strip_prefix('/')
            .and_then(|name| req.tools.iter().find(|t| t.name == name));
        if let Some(tool) = tool {
            events.push_back(ModelResponseEvent::ToolCall(ToolCallRequest {
                id: "call_0".to_owned(),
                name: tool.name.clone(),
                arguments: json!({}),
            }));
            events.push_back(ModelResponseEvent::Completed(
                ModelFinishReason::ToolCalls,
            ));
        } else {
            let words: Vec<_> = text.split(' ').collect();
            for (idx, word) in words.iter().enumerate() {
                let delta = if idx + 1 < words.len() {
                    format!("{word} ")
                } else {
                    (*word).to_owned()
                };
                events.push_back(ModelResponseEvent::MessageDelta(delta));
            }
            events.push_back(ModelResponseEvent::Completed(
                ModelFinishReason::Stop,
            ));
        }
        ready(Ok(EchoResponse { events }))
    }
}

async fn drain(
    mut resp: EchoResponse,
) -> (String, Vec<ToolCallRequest>, Option<ModelFinishReason>) {
    let mut text = String::new();
    let mut calls = vec![];
    let mut finish = None;
    while let Some(event) =
        poll_fn(|cx| Pin::new(&mut resp).poll_next_event(cx))
            .await
            .unwrap()
    {
        match event {
            ModelResponseEvent::MessageDelta(delta) => text.push_str(&delta),
            ModelResponseEvent::ToolCall(call) => calls.push(call),
            ModelResponseEvent::Completed(reason) => finish = Some(reason),
        }
    }
    (text, calls, finish)
}

#[tokio::test]
async fn test_text_completion() {
    let req = ModelRequest {
        messages: vec![
            ModelMessage::System("Be brief.".to_owned()),
            ModelMessage::User("Paris is lovely".to_owned()),
        ],
        tools: vec![],
    };
    let resp = EchoProvider.send_request(&req).await.unwrap();
    let (text, calls, finish) = drain(resp).await;
    assert_eq!(text, "Paris is lovely");
    assert!(calls.is_empty());
    assert_eq!(finish, Some(ModelFinishReason::Stop));
}

#[tokio::test]
async fn test_tool_call() {
    let req = ModelRequest {
        messages: vec![ModelMessage::User("/duckduckgo_search".to_owned())],
        tools: vec![ModelTool {
            name: "duckduckgo_search".to_owned(),
            description: "Searches the web.".to_owned(),
            parameters: json!({ "type": "object" }),
        }],
    };
    let resp = EchoProvider.send_request(&req).await.unwrap();
    let (text, calls, finish) = drain(resp).await;
    assert!(text.is_empty());
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "duckduckgo_search");
    assert_eq!(finish, Some(ModelFinishReason::ToolCalls));
}

#[tokio::test]
async fn test_error() {
    let req = ModelRequest::default();
    let err = EchoProvider.send_request(&req).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert_eq!(err.to_string(), "echo failed: other");
}
