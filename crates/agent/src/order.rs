use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use vitrine_core::catalog::format::format_price;
use vitrine_core::domain::cart::Cart;
use vitrine_core::domain::conversation::{CheckoutRef, ConversationId};
use vitrine_core::errors::{ApplicationError, CommerceError};
use vitrine_db::StateStore;

use crate::catalog_service::persistence;
use crate::payment::{
    conversation_from_reference, external_reference, PaymentError, PaymentGateway, WebhookOutcome,
};

/// What an approved payment notification did to its conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Cleared,
    AlreadySettled,
    NothingPending,
    AmountMismatch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutLink {
    pub preference_id: String,
    pub checkout_url: String,
    pub total_amount: Decimal,
}

impl CheckoutLink {
    pub fn message(&self) -> String {
        format!(
            "Your order total is {}. Complete your payment with MercadoPago here: {}",
            format_price(self.total_amount),
            self.checkout_url
        )
    }
}

pub struct OrderFinalizer {
    store: Arc<dyn StateStore>,
    gateway: Arc<dyn PaymentGateway>,
    timeout: Duration,
}

impl OrderFinalizer {
    pub fn new(store: Arc<dyn StateStore>, gateway: Arc<dyn PaymentGateway>, timeout: Duration) -> Self {
        Self { store, gateway, timeout }
    }

    /// Creates a payment preference for the current cart. The cart stays as
    /// it is until the payment is confirmed.
    pub async fn finalize(
        &self,
        id: &ConversationId,
        zipcode: &str,
    ) -> Result<CheckoutLink, ApplicationError> {
        let mut state = self.store.get(id).await.map_err(persistence)?;
        if state.cart.is_empty() {
            return Err(CommerceError::EmptyCart.into());
        }

        let preference = tokio::time::timeout(
            self.timeout,
            self.gateway.create_preference(id, state.cart.lines(), zipcode),
        )
        .await
        .map_err(|_| {
            warn!(
                event_name = "order.finalize.timeout",
                conversation_id = %id,
                timeout_ms = self.timeout.as_millis() as u64,
                "payment gateway timed out"
            );
            CommerceError::PaymentNetworkError(format!(
                "payment gateway timed out after {}ms",
                self.timeout.as_millis()
            ))
        })?
        .map_err(payment_failure)?;

        state.pending_checkout = Some(CheckoutRef {
            preference_id: preference.preference_id.clone(),
            external_reference: external_reference(id),
            total_amount: preference.total_amount,
            created_at: Utc::now(),
        });
        self.store.set(id, state).await.map_err(persistence)?;

        info!(
            event_name = "order.finalize.preference_recorded",
            conversation_id = %id,
            preference_id = %preference.preference_id,
            "checkout link issued"
        );
        Ok(CheckoutLink {
            preference_id: preference.preference_id,
            checkout_url: preference.checkout_url,
            total_amount: preference.total_amount,
        })
    }

    pub async fn review_webhook(&self, payload: &Value) -> WebhookOutcome {
        self.gateway.handle_webhook(payload).await
    }

    /// The conversation an approved payment belongs to, if any.
    pub fn settled_conversation(outcome: &WebhookOutcome) -> Option<ConversationId> {
        if !outcome.is_approved() {
            return None;
        }
        outcome.external_reference.as_deref().and_then(conversation_from_reference)
    }

    /// Empties the cart of a paid conversation and forgets its checkout.
    ///
    /// Notifications are retried by the provider, so a payment id settles at
    /// most once and only while a checkout is pending for the paid amount.
    pub async fn settle(
        &self,
        id: &ConversationId,
        outcome: &WebhookOutcome,
    ) -> Result<Settlement, ApplicationError> {
        let mut state = self.store.get(id).await.map_err(persistence)?;
        let payment_id = outcome.payment_id.as_deref().unwrap_or_default();

        if state.has_settled(payment_id) {
            info!(
                event_name = "order.payment.replayed",
                conversation_id = %id,
                payment_id,
                "payment already settled"
            );
            return Ok(Settlement::AlreadySettled);
        }

        let Some(pending) = state.pending_checkout.as_ref() else {
            warn!(
                event_name = "order.payment.nothing_pending",
                conversation_id = %id,
                payment_id,
                "approved payment without a pending checkout, cart left untouched"
            );
            return Ok(Settlement::NothingPending);
        };

        if let Some(paid) = outcome.transaction_amount {
            if paid.round_dp(2) != pending.total_amount.round_dp(2) {
                warn!(
                    event_name = "order.payment.amount_mismatch",
                    conversation_id = %id,
                    payment_id,
                    paid = %paid,
                    expected = %pending.total_amount,
                    "approved amount differs from the pending checkout"
                );
                return Ok(Settlement::AmountMismatch);
            }
        }

        state.cart = Cart::default();
        state.pending_checkout = None;
        if !payment_id.is_empty() {
            state.settled_payments.push(payment_id.to_string());
        }
        self.store.set(id, state).await.map_err(persistence)?;
        info!(event_name = "order.payment.settled", conversation_id = %id, payment_id, "cart cleared after approved payment");
        Ok(Settlement::Cleared)
    }

    pub async fn confirm_payment(&self, payload: &Value) -> Result<WebhookOutcome, ApplicationError> {
        let outcome = self.review_webhook(payload).await;
        if let Some(id) = Self::settled_conversation(&outcome) {
            self.settle(&id, &outcome).await?;
        }
        Ok(outcome)
    }
}

fn payment_failure(error: PaymentError) -> ApplicationError {
    let mapped = match error {
        PaymentError::NotConfigured => CommerceError::PaymentUnavailable(error.to_string()),
        PaymentError::Api { status } => CommerceError::PaymentApiError { status },
        other => CommerceError::PaymentNetworkError(other.to_string()),
    };
    warn!(event_name = "order.finalize.payment_failed", kind = mapped.kind(), error = %mapped, "payment preference failed");
    mapped.into()
}
