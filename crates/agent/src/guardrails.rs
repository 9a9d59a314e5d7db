use std::sync::Arc;

use tracing::warn;

use vitrine_core::errors::CommerceError;

use crate::llm::{ChatMessage, ChatRequest, LlmClient, LlmError};
use crate::prompts::PromptLibrary;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailIntent {
    SearchProducts { query: String },
    EditCart { amount: i64 },
    FinalizeOrder { adult_confirmed: bool },
}

impl GuardrailIntent {
    pub fn action_key(&self) -> &'static str {
        match self {
            Self::SearchProducts { .. } => "catalog.search",
            Self::EditCart { .. } => "cart.edit",
            Self::FinalizeOrder { .. } => "order.finalize",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

/// Per-call checks run before the catalog, cart or order is touched.
///
/// Unit counts only need to be positive here; the cart's volume capacity is
/// the upper bound and clamps oversized additions itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub require_age_confirmation: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { require_age_confirmation: true }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, intent: &GuardrailIntent) -> GuardrailDecision {
        match intent {
            GuardrailIntent::SearchProducts { query } if query.trim().is_empty() => {
                GuardrailDecision::Degrade {
                    reason_code: "empty_search_query",
                    user_message: "Tell me what kind of sunglasses you are looking for and I will search the catalog."
                        .to_string(),
                    fallback_path: "ask_for_preferences",
                }
            }
            GuardrailIntent::SearchProducts { .. } => GuardrailDecision::Allow,
            GuardrailIntent::EditCart { amount } if *amount <= 0 => {
                GuardrailDecision::Deny {
                    reason_code: "invalid_amount",
                    user_message: CommerceError::InvalidAmount { amount: *amount }.user_message(),
                    fallback_path: "ask_for_unit_count",
                }
            }
            GuardrailIntent::EditCart { .. } => GuardrailDecision::Allow,
            GuardrailIntent::FinalizeOrder { adult_confirmed: false }
                if self.require_age_confirmation =>
            {
                GuardrailDecision::Degrade {
                    reason_code: "age_confirmation_required",
                    user_message: "Before finishing your order, please confirm that you are of legal age."
                        .to_string(),
                    fallback_path: "age_confirmation_buttons",
                }
            }
            GuardrailIntent::FinalizeOrder { .. } => GuardrailDecision::Allow,
        }
    }
}

/// Asks a model whether an inbound message is a prompt-injection attempt.
pub struct JailbreakScreen {
    client: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl JailbreakScreen {
    pub fn new(client: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { client, prompts }
    }

    pub async fn is_jailbreak(&self, message: &str) -> Result<bool, LlmError> {
        let prompt = self.prompts.jailbreak_screen(message)?;
        let completion = self
            .client
            .complete(ChatRequest { messages: vec![ChatMessage::user(prompt)], ..ChatRequest::default() })
            .await?;

        let verdict = completion.content.unwrap_or_default();
        let flagged = verdict.trim().trim_matches('"').to_ascii_uppercase().starts_with('Y');
        if flagged {
            warn!(event_name = "guardrails.jailbreak.flagged", "inbound message flagged as jailbreak attempt");
        }
        Ok(flagged)
    }
}
