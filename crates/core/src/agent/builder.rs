use std::sync::Arc;

use toolchat_model::ModelProvider;

use super::Agent;
use crate::conversation::Conversation;
use crate::model_client::ModelClient;
use crate::tool::ToolClient;

/// The default number of model requests per [`Agent::run`].
pub const DEFAULT_MAX_STEPS: usize = 10;

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    tool_client: Arc<dyn ToolClient>,
    system_prompt: Option<String>,
    max_steps: usize,
    memory_enabled: bool,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider and tool
    /// client.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
        tool_client: Arc<dyn ToolClient>,
    ) -> Self {
        Self::with_model_client(ModelClient::new(provider), tool_client)
    }

    /// Creates a new builder around an existing model client, so the
    /// caller can keep using the same provider elsewhere.
    pub fn with_model_client(
        model_client: ModelClient,
        tool_client: Arc<dyn ToolClient>,
    ) -> Self {
        Self {
            model_client,
            tool_client,
            system_prompt: None,
            max_steps: DEFAULT_MAX_STEPS,
            memory_enabled: true,
        }
    }

    /// Sets the system prompt sent ahead of every request.
    #[inline]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Limits how many model requests a single run may make. Values below
    /// one are raised to one.
    #[inline]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Enables or disables remembering earlier runs.
    #[inline]
    pub fn with_memory(mut self, enabled: bool) -> Self {
        self.memory_enabled = enabled;
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        Agent {
            model_client: self.model_client,
            tool_client: self.tool_client,
            system_prompt: self.system_prompt,
            max_steps: self.max_steps,
            memory_enabled: self.memory_enabled,
            conversation: Conversation::default(),
            tools: None,
        }
    }
}
