use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};

use vitrine_core::domain::conversation::ConversationId;
use vitrine_core::errors::{ApplicationError, SYSTEM_UNAVAILABLE_MESSAGE};
use vitrine_core::response::ResponseFragment;
use vitrine_db::StateStore;

use crate::catalog_service::persistence;
use crate::dispatcher::{ActionDispatcher, TurnContext};
use crate::guardrails::JailbreakScreen;
use crate::order::OrderFinalizer;
use crate::payment::WebhookOutcome;
use crate::planner::ActionPlanner;
use crate::tools::RawToolCall;

pub const OFF_TOPIC_MESSAGE: &str =
    "I can only help you find and buy sunglasses. Could you rephrase your message?";

/// One async mutex per conversation so turns for the same user never
/// interleave.
pub struct ConversationLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    wait: Duration,
}

impl ConversationLocks {
    pub fn new(wait: Duration) -> Self {
        Self { locks: Mutex::new(HashMap::new()), wait }
    }

    /// Waits up to the configured queue time, then reports the conversation
    /// as busy.
    pub async fn acquire(&self, id: &ConversationId) -> Result<OwnedMutexGuard<()>, ApplicationError> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.retain(|key, lock| key == &id.0 || Arc::strong_count(lock) > 1);
            locks.entry(id.0.clone()).or_default().clone()
        };

        tokio::time::timeout(self.wait, lock.lock_owned())
            .await
            .map_err(|_| ApplicationError::Busy(id.0.clone()))
    }

    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    Busy,
    Unavailable,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub fragments: Vec<ResponseFragment>,
    pub outcome: TurnOutcome,
}

impl TurnReply {
    fn single(text: &str, outcome: TurnOutcome) -> Self {
        Self { fragments: vec![ResponseFragment::text(text)], outcome }
    }

    fn busy(id: &ConversationId) -> Self {
        let interface = ApplicationError::Busy(id.0.clone()).into_interface(id.0.clone());
        warn!(event_name = "runtime.turn.busy", conversation_id = %id, "conversation busy");
        Self::single(interface.user_message(), TurnOutcome::Busy)
    }
}

pub struct AgentRuntime {
    planner: Arc<dyn ActionPlanner>,
    dispatcher: Arc<ActionDispatcher>,
    store: Arc<dyn StateStore>,
    screen: Option<JailbreakScreen>,
    locks: ConversationLocks,
}

impl AgentRuntime {
    pub fn new(
        planner: Arc<dyn ActionPlanner>,
        dispatcher: Arc<ActionDispatcher>,
        store: Arc<dyn StateStore>,
        queue_wait: Duration,
    ) -> Self {
        Self { planner, dispatcher, store, screen: None, locks: ConversationLocks::new(queue_wait) }
    }

    pub fn with_jailbreak_screen(mut self, screen: JailbreakScreen) -> Self {
        self.screen = Some(screen);
        self
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn locks(&self) -> &ConversationLocks {
        &self.locks
    }

    pub async fn handle_turn(
        &self,
        message: &str,
        id: &ConversationId,
        context: &TurnContext,
    ) -> TurnReply {
        let Ok(_guard) = self.locks.acquire(id).await else {
            return TurnReply::busy(id);
        };

        if let Some(screen) = &self.screen {
            match screen.is_jailbreak(message).await {
                Ok(true) => return TurnReply::single(OFF_TOPIC_MESSAGE, TurnOutcome::Rejected),
                Ok(false) => {}
                Err(error) => warn!(
                    event_name = "runtime.screen.failed",
                    conversation_id = %id,
                    error = %error,
                    "jailbreak screen failed, continuing unscreened"
                ),
            }
        }

        let planned = match self.planner.plan(message).await {
            Ok(planned) => planned,
            Err(failure) => {
                error!(
                    event_name = "runtime.plan.failed",
                    conversation_id = %id,
                    error = %failure,
                    "planner failed"
                );
                return TurnReply::single(SYSTEM_UNAVAILABLE_MESSAGE, TurnOutcome::Unavailable);
            }
        };

        info!(
            event_name = "runtime.turn.planned",
            conversation_id = %id,
            calls = planned.calls.len(),
            "turn planned"
        );

        let mut fragments = Vec::new();
        if let Some(reply) = planned.reply.filter(|reply| !reply.trim().is_empty()) {
            fragments.push(ResponseFragment::text(reply));
        }
        let dispatched = self.dispatcher.dispatch(id, &planned.calls, context).await;
        fragments.extend(dispatched.fragments);

        TurnReply {
            fragments,
            outcome: if dispatched.aborted { TurnOutcome::Unavailable } else { TurnOutcome::Completed },
        }
    }

    /// Runs calls the caller already obtained from its own model.
    pub async fn dispatch(
        &self,
        id: &ConversationId,
        calls: &[RawToolCall],
        context: &TurnContext,
    ) -> TurnReply {
        let Ok(_guard) = self.locks.acquire(id).await else {
            return TurnReply::busy(id);
        };

        let dispatched = self.dispatcher.dispatch(id, calls, context).await;
        TurnReply {
            fragments: dispatched.fragments,
            outcome: if dispatched.aborted { TurnOutcome::Unavailable } else { TurnOutcome::Completed },
        }
    }

    pub async fn reset(&self, id: &ConversationId) -> Result<(), ApplicationError> {
        let _guard = self.locks.acquire(id).await?;
        self.store.reset(id).await.map_err(persistence)?;
        info!(event_name = "runtime.conversation.reset", conversation_id = %id, "conversation reset");
        Ok(())
    }

    pub async fn confirm_payment(&self, payload: &Value) -> Result<WebhookOutcome, ApplicationError> {
        let orders: &OrderFinalizer = self.dispatcher.orders();
        let outcome = orders.review_webhook(payload).await;
        if let Some(id) = OrderFinalizer::settled_conversation(&outcome) {
            let _guard = self.locks.acquire(&id).await?;
            orders.settle(&id, &outcome).await?;
        }
        Ok(outcome)
    }
}
