//! Agent runtime for the sunglasses shop assistant.
//!
//! The language model only translates what the user wrote into an ordered list
//! of function calls. Everything with a business consequence is decided here:
//!
//! 1. **Screening** (`guardrails`) - optional jailbreak check on inbound text
//! 2. **Planning** (`planner`, `conversation`) - message -> raw tool calls
//! 3. **Dispatch** (`dispatcher`) - calls -> catalog, cart and order services
//! 4. **Response** - ordered text fragments, optional trailing button pair
//!
//! Prices, volumes and catalog visibility never come from the model. The cart
//! only accepts products the catalog service has already shown to the user.

pub mod assembly;
pub mod cart_engine;
pub mod catalog_service;
pub mod conversation;
pub mod dispatcher;
pub mod guardrails;
pub mod llm;
pub mod matcher;
pub mod order;
pub mod payment;
pub mod planner;
pub mod prompts;
pub mod runtime;
pub mod tools;

pub use assembly::{build_runtime, build_runtime_with_gateway, load_catalog, AssemblyError};
pub use cart_engine::CartEngine;
pub use catalog_service::CatalogService;
pub use conversation::KeywordPlanner;
pub use dispatcher::{ActionDispatcher, TurnContext};
pub use guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy, JailbreakScreen};
pub use llm::{ChatCompletion, ChatMessage, ChatRequest, LlmClient, LlmError, OpenAiChatClient};
pub use matcher::{KeywordProductMatcher, LlmProductMatcher, ProductMatcher};
pub use order::{CheckoutLink, OrderFinalizer, Settlement};
pub use payment::{MercadoPagoGateway, PaymentError, PaymentGateway, WebhookOutcome};
pub use planner::{ActionPlanner, LlmActionPlanner, PlannedTurn};
pub use runtime::{AgentRuntime, ConversationLocks, TurnOutcome, TurnReply};
pub use tools::{ActionCall, RawToolCall};
