use std::sync::Arc;

use toolchat_core::tool::{self, ToolClient};
use toolchat_core::{Agent, AgentBuilder, ModelClient};
use toolchat_model::ModelProvider;

/// The system prompt of the chat agent.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("./system_prompt.md");

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    model_client: ModelClient,
    tool_client: Arc<dyn ToolClient>,
    agent_builder: AgentBuilder,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider and tool
    /// client. The agent starts with [`DEFAULT_SYSTEM_PROMPT`].
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
        tool_client: Arc<dyn ToolClient>,
    ) -> Self {
        let model_client = ModelClient::new(provider);
        let agent_builder = AgentBuilder::with_model_client(
            model_client.clone(),
            tool_client.clone(),
        )
        .with_system_prompt(DEFAULT_SYSTEM_PROMPT);
        Self {
            model_client,
            tool_client,
            agent_builder,
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Limits the model requests per turn.
    #[inline]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.agent_builder = self.agent_builder.with_max_steps(max_steps);
        self
    }

    /// Enables or disables conversation memory.
    #[inline]
    pub fn with_memory(mut self, enabled: bool) -> Self {
        self.agent_builder = self.agent_builder.with_memory(enabled);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        Session {
            agent: self.agent_builder.build(),
            model_client: self.model_client,
            tool_client: self.tool_client,
        }
    }
}

/// Everything a chat needs for its lifetime: the agent and the clients it
/// shares with the chat loop.
///
/// Closing consumes the session, so tool sessions are released at most
/// once.
pub struct Session {
    agent: Agent,
    model_client: ModelClient,
    tool_client: Arc<dyn ToolClient>,
}

impl Session {
    /// Returns the agent.
    #[inline]
    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    /// Returns the model client, shared with the agent.
    #[inline]
    pub fn model_client(&self) -> &ModelClient {
        &self.model_client
    }

    /// Returns the tool client, shared with the agent.
    #[inline]
    pub fn tool_client(&self) -> &dyn ToolClient {
        self.tool_client.as_ref()
    }

    /// Closes every tool session.
    pub async fn close(self) -> Result<(), tool::Error> {
        debug!("closing session");
        self.tool_client.close_all_sessions().await
    }
}
