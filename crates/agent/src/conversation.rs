use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use vitrine_core::catalog::Catalog;

use crate::llm::LlmError;
use crate::planner::{ActionPlanner, PlannedTurn};
use crate::tools::{RawToolCall, EDIT_CART, FINALIZE_ORDER, SEARCH_PRODUCT_RECOMMENDATION};

const FINALIZE_WORDS: &[&str] =
    &["checkout", "finalize", "finalizar", "finish", "pagar", "pay", "terminar"];
const ADD_WORDS: &[&str] = &["add", "agregar", "agrega", "agregá", "añadir", "añade", "sumar"];
const REMOVE_WORDS: &[&str] = &["delete", "eliminar", "elimina", "quitar", "quita", "remove", "sacar", "saca"];

/// Deterministic planner for offline deployments and scripted replays.
///
/// Recognises finalize requests, add/remove requests naming a catalog product
/// (with an optional unit count, default 1) and treats anything else as a
/// product search.
pub struct KeywordPlanner {
    catalog: Arc<Catalog>,
}

impl KeywordPlanner {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn plan_message(&self, message: &str) -> Vec<RawToolCall> {
        let normalized_text = normalize_text(message);
        let tokens = tokenize(&normalized_text);
        if tokens.is_empty() {
            return Vec::new();
        }

        let operation = if contains_any(&tokens, ADD_WORDS) {
            Some("add")
        } else if contains_any(&tokens, REMOVE_WORDS) {
            Some("remove")
        } else {
            None
        };

        if let Some(operation) = operation {
            if let Some(product) = self.mentioned_product(&normalized_text) {
                return vec![RawToolCall::new(
                    EDIT_CART,
                    json!({
                        "operation": operation,
                        "product": product,
                        "amount": extract_quantity(&tokens).unwrap_or(1),
                    }),
                )];
            }
        }

        if contains_any(&tokens, FINALIZE_WORDS) {
            return vec![RawToolCall::new(FINALIZE_ORDER, json!({}))];
        }

        vec![RawToolCall::new(
            SEARCH_PRODUCT_RECOMMENDATION,
            json!({"product_query": message.trim()}),
        )]
    }

    fn mentioned_product(&self, normalized_text: &str) -> Option<String> {
        self.catalog
            .products()
            .iter()
            .filter(|product| normalized_text.contains(&normalize_text(&product.product_name)))
            .max_by_key(|product| product.product_name.len())
            .map(|product| product.product_name.clone())
    }
}

#[async_trait]
impl ActionPlanner for KeywordPlanner {
    async fn plan(&self, message: &str) -> Result<PlannedTurn, LlmError> {
        Ok(PlannedTurn { reply: None, calls: self.plan_message(message) })
    }
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || character == '-' {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

fn contains_any(tokens: &[String], words: &[&str]) -> bool {
    tokens.iter().any(|token| words.contains(&token.as_str()))
}

/// Only a number followed by a unit word counts, so model codes such as
/// "714" are never read as quantities.
fn extract_quantity(tokens: &[String]) -> Option<i64> {
    for window in tokens.windows(2) {
        if let [value, unit] = window {
            if is_quantity_unit(unit) {
                if let Ok(quantity) = value.parse::<i64>() {
                    return Some(quantity);
                }
            }
        }
    }
    None
}

fn is_quantity_unit(token: &str) -> bool {
    matches!(
        token,
        "unit" | "units" | "unidad" | "unidades" | "pair" | "pairs" | "par" | "pares" | "x"
    )
}
