use serde_json::json;
use vitrine_agent::assembly::load_catalog;
use vitrine_core::catalog::format::format_price;
use vitrine_core::config::{AppConfig, LoadOptions};

use crate::commands::CommandResult;

/// Lists what a user with this zipcode would be offered.
pub fn run(zipcode: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "catalog",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let (catalog, histories) = match load_catalog(&config.catalog) {
        Ok(datasets) => datasets,
        Err(error) => return CommandResult::failure("catalog", "catalog_load", error.to_string(), 4),
    };

    let visible = catalog.visible_for(zipcode);
    let products: Vec<_> = visible
        .iter()
        .map(|product| {
            json!({
                "row_id": product.row_id,
                "product_name": product.product_name,
                "brand": product.brand,
                "style": product.style,
                "price": format_price(product.full_price),
            })
        })
        .collect();
    let history = histories.for_zipcode(zipcode).map(|record| json!({"date": record.date, "products": record.products}));

    CommandResult::success_with_data(
        "catalog",
        format!("{} of {} products visible for zipcode `{}`", visible.len(), catalog.len(), zipcode.trim()),
        Some(json!({
            "zipcode": zipcode.trim(),
            "products": products,
            "purchase_history": history,
        })),
    )
}
