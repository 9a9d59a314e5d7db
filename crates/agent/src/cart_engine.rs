use std::sync::Arc;

use tracing::{debug, info};

use vitrine_core::checkout::render_cart_summary;
use vitrine_core::domain::cart::{Cart, CartOperation, INVALID_OPERATION_MESSAGE};
use vitrine_core::domain::conversation::{ConversationId, ConversationState};
use vitrine_core::errors::{ApplicationError, CommerceError};
use vitrine_db::StateStore;

use crate::catalog_service::persistence;

/// Threads the pure cart transitions through the state store. Every public
/// mutation writes the conversation record exactly once, even when the
/// request changed nothing.
pub struct CartEngine {
    store: Arc<dyn StateStore>,
}

impl CartEngine {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub async fn get_cart(&self, id: &ConversationId) -> Result<Cart, ApplicationError> {
        Ok(self.load(id).await?.cart)
    }

    pub async fn get_summary(&self, id: &ConversationId) -> Result<String, ApplicationError> {
        Ok(render_cart_summary(&self.get_cart(id).await?))
    }

    pub async fn add(
        &self,
        id: &ConversationId,
        product_name: &str,
        amount: u32,
    ) -> Result<String, ApplicationError> {
        let state = self.load(id).await?;
        let outcome = Self::apply_add(&state, product_name, amount);
        let (next, result) = match outcome {
            Ok((cart, message)) => (state.with_cart(cart), Ok(message)),
            Err(error) => (state, Err(error)),
        };
        self.save(id, next).await?;
        result
    }

    pub async fn remove(
        &self,
        id: &ConversationId,
        product_name: &str,
        amount: u32,
    ) -> Result<String, ApplicationError> {
        let state = self.load(id).await?;
        let (cart, message) = Self::apply_remove(&state, product_name, amount);
        self.save(id, state.with_cart(cart)).await?;
        Ok(message)
    }

    /// Entry point used by the dispatcher. Unsupported operations and unknown
    /// products still persist the unchanged record, and every call marks the
    /// conversation as owing a cart summary.
    pub async fn process(
        &self,
        id: &ConversationId,
        operation: &str,
        product_name: &str,
        amount: u32,
    ) -> Result<String, ApplicationError> {
        let state = self.load(id).await?;

        let (mut next, result) = match CartOperation::parse(operation) {
            Some(CartOperation::Add) => match Self::apply_add(&state, product_name, amount) {
                Ok((cart, message)) => (state.with_cart(cart), Ok(message)),
                Err(error) => (state, Err(error)),
            },
            Some(CartOperation::Remove) => {
                let (cart, message) = Self::apply_remove(&state, product_name, amount);
                (state.with_cart(cart), Ok(message))
            }
            None => {
                debug!(
                    event_name = "cart.process.invalid_operation",
                    conversation_id = %id,
                    operation,
                    "unsupported cart operation"
                );
                (state, Ok(INVALID_OPERATION_MESSAGE.to_string()))
            }
        };

        next.should_send_cart_summary = true;
        self.save(id, next).await?;
        result
    }

    fn apply_add(
        state: &ConversationState,
        product_name: &str,
        amount: u32,
    ) -> Result<(Cart, String), ApplicationError> {
        let Some(pricing) = state.unit_pricing(product_name) else {
            return Err(CommerceError::UnknownProduct { product: product_name.to_string() }.into());
        };
        // The cart keeps the catalog spelling, not whatever casing the model used.
        let canonical_name = state
            .recommended(product_name)
            .map(|product| product.product_name.clone())
            .unwrap_or_else(|| product_name.to_string());

        let (cart, outcome) = state.cart.with_addition(&canonical_name, pricing, amount);
        info!(
            event_name = "cart.add",
            product = %canonical_name,
            requested = amount,
            added = outcome.units_added(),
            "cart addition applied"
        );
        Ok((cart, outcome.message()))
    }

    fn apply_remove(state: &ConversationState, product_name: &str, amount: u32) -> (Cart, String) {
        let (cart, outcome) = state.cart.with_removal(product_name, amount);
        info!(event_name = "cart.remove", product = %product_name, amount, outcome = ?outcome, "cart removal applied");
        (cart, outcome.message().to_string())
    }

    async fn load(&self, id: &ConversationId) -> Result<ConversationState, ApplicationError> {
        self.store.get(id).await.map_err(persistence)
    }

    async fn save(
        &self,
        id: &ConversationId,
        state: ConversationState,
    ) -> Result<(), ApplicationError> {
        self.store.set(id, state).await.map_err(persistence)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use vitrine_core::catalog::Catalog;
    use vitrine_core::domain::conversation::{ConversationId, ConversationState};
    use vitrine_core::errors::{ApplicationError, CommerceError};
    use vitrine_db::{InMemoryStateStore, StateStore};

    use super::CartEngine;

    async fn seeded(names: &[&str]) -> (CartEngine, Arc<InMemoryStateStore>, ConversationId) {
        let catalog = Catalog::bundled().expect("catalog");
        let products: Vec<_> = names
            .iter()
            .map(|name| catalog.find_by_name(name).cloned().expect("product in catalog"))
            .collect();
        let store = Arc::new(InMemoryStateStore::default());
        let id = ConversationId("user-1".to_string());
        store
            .set(&id, ConversationState::default().with_recommendations(&products))
            .await
            .expect("seed");
        (CartEngine::new(store.clone()), store, id)
    }

    #[tokio::test]
    async fn add_merges_into_one_line_using_recommended_price() {
        let (engine, _, id) = seeded(&["Ray-Ban Aviator Classic Gold"]).await;

        let message = engine.add(&id, "ray-ban aviator classic gold", 2).await.expect("add");
        assert_eq!(message, "Product successfully added to the cart!");
        engine.add(&id, "Ray-Ban Aviator Classic Gold", 3).await.expect("add");

        let cart = engine.get_cart(&id).await.expect("cart");
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.lines()[0].product_name, "Ray-Ban Aviator Classic Gold");
        assert_eq!(cart.lines()[0].number_of_units, 5);
        assert_eq!(cart.total_value(), Decimal::new(149_995, 2));
    }

    #[tokio::test]
    async fn add_clamps_to_remaining_capacity() {
        let (engine, _, id) = seeded(&["Oakley Sutro Plateado"]).await;

        engine.add(&id, "Oakley Sutro Plateado", 4_998).await.expect("add");
        let message = engine.add(&id, "Oakley Sutro Plateado", 5).await.expect("add");
        assert_eq!(
            message,
            "The maximum volume of 5 liters per order has been exceeded. The number of units was adjusted to 2."
        );
        let cart = engine.get_cart(&id).await.expect("cart");
        assert_eq!(cart.lines()[0].number_of_units, 5_000);
        assert_eq!(cart.total_volume(), Decimal::new(5, 0));

        let message = engine.add(&id, "Oakley Sutro Plateado", 1).await.expect("add");
        assert!(message.contains("adjusted to 0"));
        assert_eq!(engine.get_cart(&id).await.expect("cart").lines()[0].number_of_units, 5_000);
    }

    #[tokio::test]
    async fn add_of_unrecommended_product_fails_but_persists() {
        let (engine, store, id) = seeded(&[]).await;
        let missing = ConversationId("fresh".to_string());

        let error = engine.add(&missing, "Persol 714 Marrón", 1).await.expect_err("unknown");
        assert!(matches!(
            error,
            ApplicationError::Commerce(CommerceError::UnknownProduct { .. })
        ));
        assert_eq!(store.len().await, 2);
        assert!(engine.get_cart(&id).await.expect("cart").is_empty());
    }

    #[tokio::test]
    async fn remove_reports_each_outcome() {
        let (engine, _, id) = seeded(&["Gucci GG0061S Negro"]).await;

        assert_eq!(
            engine.remove(&id, "Gucci GG0061S Negro", 1).await.expect("remove"),
            "Product not found in the cart."
        );

        engine.add(&id, "Gucci GG0061S Negro", 3).await.expect("add");
        assert_eq!(
            engine.remove(&id, "Gucci GG0061S Negro", 1).await.expect("remove"),
            "Product units successfully removed from the cart!"
        );
        assert_eq!(engine.get_cart(&id).await.expect("cart").lines()[0].number_of_units, 2);

        assert_eq!(
            engine.remove(&id, "Gucci GG0061S Negro", 7).await.expect("remove"),
            "The number of units to remove is greater than the number of units in the cart. Therefore, this operation only completely removed the product."
        );
        assert!(engine.get_cart(&id).await.expect("cart").is_empty());
    }

    #[tokio::test]
    async fn process_rejects_unknown_operations_without_touching_the_cart() {
        let (engine, _, id) = seeded(&["Prada PR 17WS Negro"]).await;
        engine.process(&id, " ADD ", "Prada PR 17WS Negro", 1).await.expect("add");

        let message = engine.process(&id, "replace", "Prada PR 17WS Negro", 9).await.expect("process");
        assert_eq!(message, "Invalid operation");
        assert_eq!(engine.get_cart(&id).await.expect("cart").lines()[0].number_of_units, 1);

        let message = engine.process(&id, "Remove", "Prada PR 17WS Negro", 1).await.expect("process");
        assert_eq!(message, "Product units successfully removed from the cart!");
    }

    #[tokio::test]
    async fn process_flags_the_summary_but_plain_add_does_not() {
        let (engine, store, id) = seeded(&["Prada PR 17WS Negro"]).await;

        engine.add(&id, "Prada PR 17WS Negro", 1).await.expect("add");
        assert!(!store.get(&id).await.expect("state").should_send_cart_summary);

        engine.process(&id, "bogus", "Prada PR 17WS Negro", 1).await.expect("process");
        assert!(store.get(&id).await.expect("state").should_send_cart_summary);
    }

    #[tokio::test]
    async fn summary_of_unknown_conversation_is_empty_cart() {
        let (engine, _, _) = seeded(&[]).await;
        let summary = engine.get_summary(&ConversationId("nobody".into())).await.expect("summary");
        assert!(summary.contains("Distinct products: 0"));
        assert!(summary.contains("Total cart volume: 0L"));
    }
}
