use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::cart::{Cart, UnitPricing, UNIT_VOLUME_LITERS};
use crate::domain::product::Product;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a payment preference created when the user asked to finalize.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRef {
    pub preference_id: String,
    pub external_reference: String,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Everything the engine remembers about one conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub cart: Cart,
    #[serde(default)]
    pub recommended_products: Vec<Product>,
    #[serde(default)]
    pub should_send_cart_summary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_checkout: Option<CheckoutRef>,
    /// Payment ids whose approval already emptied the cart.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settled_payments: Vec<String>,
}

impl ConversationState {
    pub fn recommended(&self, product_name: &str) -> Option<&Product> {
        self.recommended_products.iter().find(|product| product.is_named(product_name))
    }

    pub fn was_recommended(&self, product_name: &str) -> bool {
        self.recommended(product_name).is_some()
    }

    pub fn unit_pricing(&self, product_name: &str) -> Option<UnitPricing> {
        self.recommended(product_name).map(|product| UnitPricing {
            price_per_unit: product.full_price,
            volume_per_unit: UNIT_VOLUME_LITERS,
        })
    }

    /// Appends newly shown products, keeping first-seen order and skipping
    /// names that were already recommended.
    pub fn with_recommendations(mut self, products: &[Product]) -> Self {
        for product in products {
            if !self.was_recommended(&product.product_name) {
                self.recommended_products.push(product.clone());
            }
        }
        self
    }

    pub fn has_settled(&self, payment_id: &str) -> bool {
        self.settled_payments.iter().any(|settled| settled == payment_id)
    }

    pub fn with_cart(mut self, cart: Cart) -> Self {
        self.cart = cart;
        self
    }
}
