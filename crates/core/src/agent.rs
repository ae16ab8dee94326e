mod builder;
mod response;

use std::sync::Arc;

use toolchat_model::{
    ModelMessage, ModelProviderError, ModelRequest, ModelTool,
    ToolCallRequest, ToolCallResult,
};
use tracing::Instrument;

use crate::conversation::Conversation;
use crate::model_client::ModelClient;
use crate::tool::{self, ToolClient};
pub use builder::AgentBuilder;
pub use response::AgentResponse;

/// Errors from [`Agent::run`].
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The model request failed.
    #[error("{0}")]
    Model(Box<dyn ModelProviderError>),
    /// The tool client could not list its tools.
    #[error("failed to list tools: {0}")]
    ToolList(tool::Error),
    /// The model asked for a tool in a shape that can't be executed.
    #[error("malformed tool request: {0}")]
    MalformedToolRequest(String),
}

/// A conversational agent.
///
/// Each [`run`](Agent::run) sends the user text to the model together with
/// the tools of the tool client, executes the tool calls the model asks
/// for, and feeds the results back until the model answers in text or the
/// step budget is used up. A tool call that arrives on the last step is
/// not executed; it is handed back as [`AgentResponse::ToolRequest`].
///
/// With memory enabled, every successful run is appended to the
/// conversation and replayed in later runs.
pub struct Agent {
    model_client: ModelClient,
    tool_client: Arc<dyn ToolClient>,
    system_prompt: Option<String>,
    max_steps: usize,
    memory_enabled: bool,
    conversation: Conversation,
    tools: Option<Vec<ModelTool>>,
}

impl Agent {
    /// Answers `input`.
    pub async fn run(
        &mut self,
        input: &str,
    ) -> Result<AgentResponse, AgentError> {
        let span = debug_span!("agent run", max_steps = self.max_steps);
        self.run_steps(input).instrument(span).await
    }

    /// Returns the remembered conversation.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Forgets the remembered conversation.
    #[inline]
    pub fn clear_history(&mut self) {
        self.conversation.clear();
    }

    /// Returns the model client the agent talks to.
    #[inline]
    pub fn model_client(&self) -> &ModelClient {
        &self.model_client
    }

    async fn run_steps(
        &mut self,
        input: &str,
    ) -> Result<AgentResponse, AgentError> {
        let tools = self.tools().await?;
        let mut turn = vec![ModelMessage::User(input.to_owned())];
        let mut step = 0;

        loop {
            step += 1;
            let req = ModelRequest {
                messages: self.prefix().chain(turn.iter().cloned()).collect(),
                tools: tools.clone(),
            };
            let resp = self
                .model_client
                .send_request(req)
                .await
                .map_err(AgentError::Model)?;
            debug!(step, tool_calls = resp.tool_calls.len(), "model replied");

            let Some(first_call) = resp.tool_calls.first().cloned() else {
                let answer = AgentResponse::from_text(resp.text.clone())?;
                turn.push(resp.to_message());
                self.remember(turn);
                return Ok(answer);
            };

            if step >= self.max_steps {
                // An assistant message with unanswered tool calls would
                // poison later requests, so it is not remembered.
                let extra = resp.tool_calls.len() - 1;
                if extra > 0 {
                    warn!("step budget exhausted, dropping {extra} tool calls");
                }
                let request = AgentResponse::from_tool_call(first_call)?;
                self.remember(turn);
                return Ok(request);
            }

            turn.push(resp.to_message());
            for call in resp.tool_calls {
                let id = call.id.clone();
                let content = self.execute(call).await;
                turn.push(ModelMessage::Tool(ToolCallResult { id, content }));
            }
        }
    }

    /// The system prompt followed by remembered messages.
    fn prefix(&self) -> impl Iterator<Item = ModelMessage> + '_ {
        self.system_prompt
            .iter()
            .map(|prompt| ModelMessage::System(prompt.clone()))
            .chain(self.conversation.messages().iter().cloned())
    }

    async fn tools(&mut self) -> Result<Vec<ModelTool>, AgentError> {
        if let Some(tools) = &self.tools {
            return Ok(tools.clone());
        }
        let tools = self
            .tool_client
            .list_tools()
            .await
            .map_err(AgentError::ToolList)?;
        debug!("discovered {} tools", tools.len());
        self.tools = Some(tools.clone());
        Ok(tools)
    }

    /// Runs one tool call. Failures are reported to the model as the tool
    /// output rather than aborting the run.
    async fn execute(&self, call: ToolCallRequest) -> String {
        let ToolCallRequest {
            id,
            name,
            arguments,
        } = call;
        trace!("calling tool {name} ({id}) with {arguments}");

        let result = match tool::arguments_from_value(arguments) {
            Ok(arguments) => self
                .tool_client
                .call_tool(&name, arguments)
                .instrument(debug_span!("tool call", tool = %name))
                .await,
            Err(err) => Err(err),
        };
        match result {
            Ok(value) => tool::result_to_text(&value),
            Err(err) => {
                warn!("tool {name} failed: {err}");
                format!("Error: {err}")
            }
        }
    }

    fn remember(&mut self, turn: Vec<ModelMessage>) {
        if self.memory_enabled {
            self.conversation.extend(turn);
        }
    }
}
