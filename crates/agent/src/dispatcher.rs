use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use vitrine_core::checkout::render_cart_summary;
use vitrine_core::domain::conversation::ConversationId;
use vitrine_core::errors::{ApplicationError, SYSTEM_UNAVAILABLE_MESSAGE};
use vitrine_core::response::ResponseFragment;
use vitrine_db::StateStore;

use crate::cart_engine::CartEngine;
use crate::catalog_service::{persistence, CatalogService};
use crate::guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy};
use crate::order::OrderFinalizer;
use crate::tools::{ActionCall, RawToolCall, EDIT_CART};

pub const NO_MATCHES_MESSAGE: &str =
    "I could not find sunglasses matching that request. Could you describe what you are looking for in another way?";

/// What the dialogue layer knows about the user at the time of the turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnContext {
    #[serde(default)]
    pub zipcode: Option<String>,
    #[serde(default)]
    pub adult_confirmed: bool,
}

impl TurnContext {
    pub fn zipcode(&self) -> &str {
        self.zipcode.as_deref().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dispatched {
    pub fragments: Vec<ResponseFragment>,
    /// Set when the state store failed and the turn was cut short.
    pub aborted: bool,
}

enum Step {
    Reply(String),
    Silent,
    AskAge(String),
}

/// Executes a turn's calls in order and collects the user-facing fragments.
pub struct ActionDispatcher {
    catalog: Arc<CatalogService>,
    cart: Arc<CartEngine>,
    orders: Arc<OrderFinalizer>,
    store: Arc<dyn StateStore>,
    guardrails: GuardrailPolicy,
}

impl ActionDispatcher {
    pub fn new(
        catalog: Arc<CatalogService>,
        cart: Arc<CartEngine>,
        orders: Arc<OrderFinalizer>,
        store: Arc<dyn StateStore>,
        guardrails: GuardrailPolicy,
    ) -> Self {
        Self { catalog, cart, orders, store, guardrails }
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    pub fn cart(&self) -> &CartEngine {
        &self.cart
    }

    pub fn orders(&self) -> &OrderFinalizer {
        &self.orders
    }

    pub async fn dispatch(
        &self,
        id: &ConversationId,
        calls: &[RawToolCall],
        context: &TurnContext,
    ) -> Dispatched {
        let mut fragments = Vec::new();
        let mut ask_age = false;
        // Denied and malformed edits count too: the turn still ends with a summary.
        let mut cart_edit_seen = false;

        for call in calls {
            cart_edit_seen |= call.name == EDIT_CART;
            let action = match ActionCall::decode(call) {
                Ok(action) => action,
                Err(error) => {
                    warn!(
                        event_name = "dispatch.call.malformed",
                        conversation_id = %id,
                        action = %call.name,
                        error = %error,
                        "could not decode call arguments"
                    );
                    fragments.push(ResponseFragment::text(error.user_message()));
                    continue;
                }
            };

            debug!(event_name = "dispatch.call.start", conversation_id = %id, action = action.name(), "executing call");
            match self.execute(id, &action, context).await {
                Ok(Step::Reply(text)) => fragments.push(ResponseFragment::text(text)),
                Ok(Step::Silent) => {}
                Ok(Step::AskAge(text)) => {
                    fragments.push(ResponseFragment::text(text));
                    ask_age = true;
                }
                Err(ApplicationError::Commerce(error)) => {
                    warn!(
                        event_name = "dispatch.call.rejected",
                        conversation_id = %id,
                        action = action.name(),
                        kind = error.kind(),
                        "call rejected"
                    );
                    fragments.push(ResponseFragment::text(error.user_message()));
                }
                Err(failure) => return Self::abort(id, fragments, &failure),
            }
        }

        if let Err(failure) = self.flush_cart_summary(id, cart_edit_seen, &mut fragments).await {
            return Self::abort(id, fragments, &failure);
        }

        if ask_age {
            fragments.push(ResponseFragment::age_confirmation());
        }
        Dispatched { fragments, aborted: false }
    }

    async fn execute(
        &self,
        id: &ConversationId,
        action: &ActionCall,
        context: &TurnContext,
    ) -> Result<Step, ApplicationError> {
        match action {
            ActionCall::SearchProductRecommendation { product_query } => {
                let intent = GuardrailIntent::SearchProducts { query: product_query.clone() };
                if let Some(step) = self.screen(id, &intent) {
                    return Ok(step);
                }
                let block = self.catalog.search(id, product_query, context.zipcode()).await?;
                if block.is_empty() {
                    Ok(Step::Reply(NO_MATCHES_MESSAGE.to_string()))
                } else {
                    Ok(Step::Reply(block))
                }
            }
            ActionCall::EditCart { operation, product, amount } => {
                if let Some(step) = self.screen(id, &GuardrailIntent::EditCart { amount: *amount }) {
                    return Ok(step);
                }
                let amount = u32::try_from(*amount).unwrap_or(u32::MAX);
                self.cart.process(id, operation, product, amount).await.map(Step::Reply)
            }
            ActionCall::FinalizeOrder => {
                let intent = GuardrailIntent::FinalizeOrder { adult_confirmed: context.adult_confirmed };
                if let Some(step) = self.screen(id, &intent) {
                    return Ok(step);
                }
                let link = self.orders.finalize(id, context.zipcode()).await?;
                Ok(Step::Reply(link.message()))
            }
            ActionCall::Unrecognized { name } => {
                debug!(event_name = "dispatch.call.ignored", conversation_id = %id, action = %name, "ignoring unknown call");
                Ok(Step::Silent)
            }
        }
    }

    /// `None` lets the call proceed.
    fn screen(&self, id: &ConversationId, intent: &GuardrailIntent) -> Option<Step> {
        match self.guardrails.evaluate(intent) {
            GuardrailDecision::Allow => None,
            GuardrailDecision::Deny { reason_code, user_message, fallback_path } => {
                warn!(
                    event_name = "guardrails.denied",
                    conversation_id = %id,
                    action = intent.action_key(),
                    reason_code,
                    fallback_path,
                    "call denied"
                );
                Some(Step::Reply(user_message))
            }
            GuardrailDecision::Degrade { reason_code, user_message, fallback_path } => {
                info!(
                    event_name = "guardrails.degraded",
                    conversation_id = %id,
                    action = intent.action_key(),
                    reason_code,
                    fallback_path,
                    "call degraded"
                );
                if reason_code == "age_confirmation_required" {
                    Some(Step::AskAge(user_message))
                } else {
                    Some(Step::Reply(user_message))
                }
            }
        }
    }

    async fn flush_cart_summary(
        &self,
        id: &ConversationId,
        cart_edit_seen: bool,
        fragments: &mut Vec<ResponseFragment>,
    ) -> Result<(), ApplicationError> {
        let mut state = self.store.get(id).await.map_err(persistence)?;
        if !cart_edit_seen && !state.should_send_cart_summary {
            return Ok(());
        }

        fragments.push(ResponseFragment::text(render_cart_summary(&state.cart)));
        if !state.should_send_cart_summary {
            return Ok(());
        }
        state.should_send_cart_summary = false;
        self.store.set(id, state).await.map_err(persistence)
    }

    fn abort(
        id: &ConversationId,
        mut fragments: Vec<ResponseFragment>,
        failure: &ApplicationError,
    ) -> Dispatched {
        error!(
            event_name = "dispatch.turn.aborted",
            conversation_id = %id,
            error = %failure,
            "state store failure aborted the turn"
        );
        fragments.push(ResponseFragment::text(SYSTEM_UNAVAILABLE_MESSAGE));
        Dispatched { fragments, aborted: true }
    }
}
