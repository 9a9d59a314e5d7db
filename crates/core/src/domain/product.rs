use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub u32);

/// A sunglasses entry of the static catalog. Never mutated at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub row_id: ProductId,
    pub product_name: String,
    pub brand: String,
    pub model: String,
    pub color: String,
    pub frame_material: String,
    pub lens_type: String,
    pub uv_protection: String,
    pub size: String,
    pub style: String,
    pub full_price: Decimal,
    pub image_url: String,
    pub description: String,
}

impl Product {
    pub fn is_named(&self, name: &str) -> bool {
        same_product_name(&self.product_name, name)
    }
}

/// Product names arrive from a language model, so matching ignores case and
/// surrounding whitespace.
pub fn same_product_name(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}
