use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use pin_project_lite::pin_project;
use serde_json::{Map, Value};
use toolchat_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    OpaqueMessage, ToolCallRequest,
};

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, Message, ToolCall};

/// Source of ids for messages whose chunks carried none.
static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// Everything received so far, carried from one poll future to the next.
struct StreamState {
    sse: Sse,
    id: Option<String>,
    content: String,
    tool_calls: Vec<ToolCall>,
    // Events decoded from the stream but not yet handed out.
    queue: VecDeque<ModelResponseEvent>,
    completed: bool,
    exhausted: bool,
}

impl StreamState {
    fn new(sse: Sse) -> Self {
        Self {
            sse,
            id: None,
            content: String::new(),
            tool_calls: vec![],
            queue: VecDeque::new(),
            completed: false,
            exhausted: false,
        }
    }

    /// The whole assistant message. Some upstreams send chunks without an
    /// id, so a local one is made up rather than losing the tool calls.
    fn into_message(self) -> (String, Message) {
        let has_tool_calls = !self.tool_calls.is_empty();
        let content = if self.content.is_empty() && has_tool_calls {
            None
        } else {
            Some(self.content)
        };
        let id = self.id.unwrap_or_else(|| {
            format!("msg-{}", NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed))
        });
        (
            id,
            Message::Assistant {
                content,
                tool_calls: has_tool_calls.then_some(self.tool_calls),
            },
        )
    }

    fn apply_chunk(&mut self, chunk: ChatCompletionChunk) -> Result<(), Error> {
        if let Some(err) = chunk.error {
            return Err(Error::new(err.message, ErrorKind::Other));
        }
        if !chunk.id.is_empty()
            && self.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id
        {
            return Err(Error::new("chunk id mismatch", ErrorKind::Other));
        }

        for choice in chunk.choices {
            if let Some(content) =
                choice.delta.content.filter(|c| !c.is_empty())
            {
                self.content.push_str(&content);
                self.queue.push_back(ModelResponseEvent::MessageDelta(content));
            }
            for fragment in choice.delta.tool_calls.unwrap_or_default() {
                merge_tool_call(&mut self.tool_calls, fragment);
            }
            if let Some(reason) = choice.finish_reason {
                self.complete(&reason)?;
            }
        }
        Ok(())
    }

    /// Emits the assembled tool calls and the completion event. Tool call
    /// arguments are only complete once the choice has finished.
    fn complete(&mut self, reason: &str) -> Result<(), Error> {
        if self.completed {
            return Ok(());
        }
        self.completed = true;

        for call in &self.tool_calls {
            self.queue
                .push_back(ModelResponseEvent::ToolCall(to_request(call)));
        }
        let reason = match reason {
            "content_filter" => {
                return Err(Error::new(
                    "the response was blocked by the content filter",
                    ErrorKind::Moderated,
                ));
            }
            _ if !self.tool_calls.is_empty() => ModelFinishReason::ToolCalls,
            "length" => ModelFinishReason::Length,
            _ => ModelFinishReason::Stop,
        };
        self.queue.push_back(ModelResponseEvent::Completed(reason));
        Ok(())
    }
}

fn merge_tool_call(calls: &mut Vec<ToolCall>, fragment: ToolCall) {
    let existing = match fragment.index {
        Some(index) => calls.iter_mut().find(|c| c.index == Some(index)),
        // Without an index, a fragment with an id starts a new call and
        // anything else continues the last one.
        None if fragment.id.is_none() => calls.last_mut(),
        None => None,
    };
    let Some(call) = existing else {
        calls.push(fragment);
        return;
    };

    if call.id.is_none() {
        call.id = fragment.id;
    }
    if call.r#type.is_none() {
        call.r#type = fragment.r#type;
    }
    let Some(function) = fragment.function else {
        return;
    };
    let Some(target) = call.function.as_mut() else {
        call.function = Some(function);
        return;
    };
    if let Some(name) = function.name {
        target.name.get_or_insert_default().push_str(&name);
    }
    if let Some(arguments) = function.arguments {
        target.arguments.get_or_insert_default().push_str(&arguments);
    }
}

fn to_request(call: &ToolCall) -> ToolCallRequest {
    let function = call.function.as_ref();
    let raw_arguments = function
        .and_then(|f| f.arguments.as_deref())
        .unwrap_or_default()
        .trim();
    let arguments = if raw_arguments.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(raw_arguments).unwrap_or_else(|err| {
            warn!("tool call arguments are not valid JSON: {err}");
            Value::String(raw_arguments.to_owned())
        })
    };
    ToolCallRequest {
        id: call.id.clone().unwrap_or_default(),
        name: function.and_then(|f| f.name.clone()).unwrap_or_default(),
        arguments,
    }
}

type Step = Result<(Option<ModelResponseEvent>, StreamState), Error>;

pin_project! {
    pub struct OpenAIResponse {
        next_step: Option<BoxFuture<'static, Step>>,
        full_msg: Option<(String, Message)>,
    }
}

impl OpenAIResponse {
    pub fn from_sse(sse: Sse) -> Self {
        Self {
            next_step: Some(next_event(StreamState::new(sse)).boxed()),
            full_msg: None,
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_step) = this.next_step else {
            return Poll::Ready(Ok(None));
        };
        let step = ready!(next_step.as_mut().poll(cx));
        *this.next_step = None;
        match step {
            Ok((Some(event), state)) => {
                *this.next_step = Some(next_event(state).boxed());
                Poll::Ready(Ok(Some(event)))
            }
            Ok((None, state)) => {
                *this.full_msg = Some(state.into_message());
                Poll::Ready(Ok(None))
            }
            Err(err) => Poll::Ready(Err(err)),
        }
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        self.full_msg
            .as_ref()
            .map(|(id, msg)| OpaqueMessage::new(id, msg.clone()))
    }
}

async fn next_event(mut state: StreamState) -> Step {
    loop {
        if let Some(event) = state.queue.pop_front() {
            return Ok((Some(event), state));
        }
        if state.exhausted {
            return Ok((None, state));
        }

        let data = state.sse.next_event().await.map_err(|err| {
            Error::new(format!("broken event stream: {err:?}"), ErrorKind::Other)
        })?;
        let Some(data) = data.filter(|data| data != "[DONE]") else {
            state.exhausted = true;
            // Some upstreams close the stream without a finish reason.
            if !state.completed
                && (!state.content.is_empty() || !state.tool_calls.is_empty())
            {
                state.complete("stop")?;
            }
            continue;
        };
        trace!("got sse event: {data}");

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&data)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        state.apply_chunk(chunk)?;
    }
}
