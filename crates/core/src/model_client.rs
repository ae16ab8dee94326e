use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use toolchat_model::{
    ModelFinishReason, ModelMessage, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, OpaqueMessage,
    ToolCallRequest,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type SendFn = Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A type-erased handle to a model provider that collects streamed
/// responses into complete ones.
///
/// Cloning is cheap; clones share the provider.
#[derive(Clone)]
pub struct ModelClient {
    send_fn: SendFn,
}

impl ModelClient {
    /// Wraps a provider.
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        let send_fn: SendFn = Arc::new(move |req: ModelRequest| {
            trace!(
                messages = req.messages.len(),
                tools = req.tools.len(),
                "sending model request"
            );
            let fut = provider.send_request(&req);
            Box::pin(
                async move { collect_response::<P>(fut.await).await }
                    .instrument(trace_span!("model request")),
            )
        });
        Self { send_fn }
    }

    /// Sends a request and waits for the complete response.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming when the
    /// future is dropped.
    #[inline]
    pub async fn send_request(&self, req: ModelRequest) -> SendRequestResult {
        (self.send_fn)(req).await
    }

    /// Sends `messages` without offering any tools and returns the
    /// completion text.
    pub async fn complete(
        &self,
        messages: Vec<ModelMessage>,
    ) -> Result<String, Box<dyn ModelProviderError>> {
        let req = ModelRequest {
            messages,
            tools: vec![],
        };
        Ok(self.send_request(req).await?.text)
    }
}

/// A completely received response.
#[derive(Clone, Debug, Default)]
pub struct ModelClientResponse {
    /// The full assistant text.
    pub text: String,
    /// The provider's own copy of the assistant message, if it has one.
    pub opaque_msg: Option<OpaqueMessage>,
    /// Tool calls requested by the model, in order.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Why the model stopped, if it said.
    pub finish_reason: Option<ModelFinishReason>,
}

impl ModelClientResponse {
    /// Returns the message to record in the conversation for this
    /// response. The provider's opaque message is preferred, since a plain
    /// assistant text would lose the tool calls.
    pub fn to_message(&self) -> ModelMessage {
        match &self.opaque_msg {
            Some(opaque) => ModelMessage::Opaque(opaque.clone()),
            None => ModelMessage::Assistant(self.text.clone()),
        }
    }
}

async fn collect_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
) -> SendRequestResult {
    let resp = resp_or_err.map_err(|err| {
        error!("model request failed: {err}");
        Box::new(err) as Box<dyn ModelProviderError>
    })?;

    let mut collected = ModelClientResponse::default();
    let mut resp = pin!(resp);
    loop {
        let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .map_err(|err| {
                error!("model response failed: {err}");
                Box::new(err) as Box<dyn ModelProviderError>
            })?;
        let Some(event) = event else {
            collected.opaque_msg = resp.make_opaque_message();
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(delta) => {
                collected.text.push_str(&delta);
            }
            ModelResponseEvent::ToolCall(req) => collected.tool_calls.push(req),
            ModelResponseEvent::Completed(reason) => {
                collected.finish_reason = Some(reason);
            }
        }
    }

    trace!(
        finish_reason = ?collected.finish_reason,
        tool_calls = collected.tool_calls.len(),
        "model response complete"
    );
    Ok(collected)
}
