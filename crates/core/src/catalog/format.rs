use rust_decimal::Decimal;

use crate::catalog::PurchaseRecord;
use crate::domain::product::Product;

pub fn format_price(amount: Decimal) -> String {
    format!("R${:.2}", amount.round_dp(2))
}

/// User-facing block for a set of recommended products; empty when nothing
/// matched.
pub fn recommendation_block(products: &[Product]) -> String {
    products
        .iter()
        .map(|product| {
            format!(
                "🕶️ {}\n   Marca: {}\n   Color: {}\n   Estilo: {}\n   Protección UV: {}\n   Precio: {}",
                product.product_name,
                product.brand,
                product.color,
                product.style,
                product.uv_protection,
                format_price(product.full_price)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One line per visible product, as handed to the recommendation model.
pub fn catalog_listing(products: &[Product]) -> String {
    products
        .iter()
        .map(|product| {
            format!(
                "- {} | marca: {} | modelo: {} | color: {} | montura: {} | lente: {} | UV: {} | talla: {} | estilo: {} | precio: {}",
                product.product_name,
                product.brand,
                product.model,
                product.color,
                product.frame_material,
                product.lens_type,
                product.uv_protection,
                product.size,
                product.style,
                format_price(product.full_price)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn purchase_history_text(record: Option<&PurchaseRecord>) -> String {
    let Some(record) = record else {
        return String::new();
    };

    record
        .products
        .iter()
        .map(|product| format!("- {product} (purchased on {})", record.date))
        .collect::<Vec<_>>()
        .join("\n")
}
