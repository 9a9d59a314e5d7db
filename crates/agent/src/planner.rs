use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::{ChatMessage, ChatRequest, LlmClient, LlmError};
use crate::prompts::PromptLibrary;
use crate::tools::{tool_definitions, RawToolCall};

/// What the model decided to do with one user message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlannedTurn {
    /// Free text the model wants to say besides its function calls.
    pub reply: Option<String>,
    pub calls: Vec<RawToolCall>,
}

#[async_trait]
pub trait ActionPlanner: Send + Sync {
    async fn plan(&self, message: &str) -> Result<PlannedTurn, LlmError>;
}

pub struct LlmActionPlanner {
    client: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmActionPlanner {
    pub fn new(client: Arc<dyn LlmClient>, prompts: &PromptLibrary) -> Result<Self, LlmError> {
        Ok(Self { client, system_prompt: prompts.system()? })
    }
}

#[async_trait]
impl ActionPlanner for LlmActionPlanner {
    async fn plan(&self, message: &str) -> Result<PlannedTurn, LlmError> {
        let completion = self
            .client
            .complete(ChatRequest {
                messages: vec![
                    ChatMessage::system(self.system_prompt.clone()),
                    ChatMessage::user(message),
                ],
                tools: tool_definitions(),
                json_mode: false,
            })
            .await?;

        Ok(PlannedTurn { reply: completion.content, calls: completion.tool_calls })
    }
}
