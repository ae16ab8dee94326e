//! The read-dispatch-print loop.

use std::io;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use toolchat_core::tool;
use toolchat_core::{AgentError, AgentResponse};
use toolchat_model::{ModelMessage, ModelProviderError, ToolCallResult};

use crate::Session;

/// The input prompt.
pub const PROMPT: &str = "You: ";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";
const SUMMARY_INSTRUCTION: &str = "Summarize this result for the user cleanly.";
const SUMMARY_TOOL_CALL_ID: &str = "call_summary";

/// A failed turn. The chat goes on after reporting it.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The agent failed.
    #[error(transparent)]
    Agent(#[from] AgentError),
    /// The tool requested by the agent failed.
    #[error(transparent)]
    Tool(#[from] tool::Error),
    /// Summarizing the tool result failed.
    #[error("{0}")]
    Summary(Box<dyn ModelProviderError>),
}

/// Returns `true` if `input` ends the chat.
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Answers one line of user input.
///
/// A tool request handed back by the agent is carried out here, and the
/// model is asked to summarize its result.
pub async fn run_turn(
    session: &mut Session,
    input: &str,
) -> Result<String, TurnError> {
    let (name, arguments) = match session.agent_mut().run(input).await? {
        AgentResponse::FinalAnswer(text) => return Ok(text),
        AgentResponse::ToolRequest { name, arguments } => (name, arguments),
    };

    debug!("calling {name} for the agent");
    let result = session.tool_client().call_tool(&name, arguments).await?;
    session
        .model_client()
        .complete(summary_messages(input, &result))
        .await
        .map_err(TurnError::Summary)
}

fn summary_messages(input: &str, result: &Value) -> Vec<ModelMessage> {
    vec![
        ModelMessage::System(SUMMARY_SYSTEM_PROMPT.to_owned()),
        ModelMessage::User(input.to_owned()),
        ModelMessage::Tool(ToolCallResult {
            id: SUMMARY_TOOL_CALL_ID.to_owned(),
            content: result.to_string(),
        }),
        ModelMessage::System(SUMMARY_INSTRUCTION.to_owned()),
    ]
}

/// Observes turn boundaries, e.g. to animate a spinner while the model is
/// working.
pub trait TurnObserver {
    /// A turn is about to be dispatched.
    fn turn_started(&mut self);
    /// The turn is over and its outcome is about to be printed.
    fn turn_finished(&mut self);
}

impl TurnObserver for () {
    fn turn_started(&mut self) {}

    fn turn_finished(&mut self) {}
}

/// A line-oriented chat over any reader and writer.
pub struct ChatLoop<R, W> {
    input: R,
    output: W,
    observer: Option<Box<dyn TurnObserver>>,
}

impl<R, W> ChatLoop<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a chat reading `input` and writing `output`.
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            observer: None,
        }
    }

    /// Attaches an observer of turn boundaries.
    #[inline]
    pub fn with_observer(mut self, observer: impl TurnObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Chats until `exit`, `quit` or end of input, then closes the session.
    pub async fn run(mut self, mut session: Session) -> io::Result<()> {
        let result = self.converse(&mut session).await;
        if let Err(err) = session.close().await {
            warn!("failed to close tool sessions: {err}");
        }
        result
    }

    async fn converse(&mut self, session: &mut Session) -> io::Result<()> {
        loop {
            let Some(line) = self.read_line().await? else {
                debug!("end of input");
                return Ok(());
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if is_exit_command(input) {
                return Ok(());
            }

            if let Some(observer) = &mut self.observer {
                observer.turn_started();
            }
            let outcome = run_turn(session, input).await;
            if let Some(observer) = &mut self.observer {
                observer.turn_finished();
            }

            let reply = match outcome {
                Ok(text) => format!("Assistant: {text}\n"),
                Err(err) => {
                    warn!("turn failed: {err:?}");
                    format!("Error: {err}\n")
                }
            };
            self.output.write_all(reply.as_bytes()).await?;
            self.output.flush().await?;
        }
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        self.output.write_all(PROMPT.as_bytes()).await?;
        self.output.flush().await?;

        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}
