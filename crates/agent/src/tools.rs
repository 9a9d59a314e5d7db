use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use vitrine_core::errors::CommerceError;

pub const SEARCH_PRODUCT_RECOMMENDATION: &str = "search_product_recommendation";
pub const EDIT_CART: &str = "edit_cart";
pub const FINALIZE_ORDER: &str = "finalize_order";

/// A function call exactly as the model emitted it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl RawToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self { name: name.into(), arguments }
    }

    /// Chat-completions APIs deliver arguments as a JSON-encoded string.
    /// Unparseable text is kept as a string so decoding reports it.
    pub fn from_encoded(name: impl Into<String>, encoded_arguments: &str) -> Self {
        let arguments = if encoded_arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(encoded_arguments)
                .unwrap_or_else(|_| Value::String(encoded_arguments.to_string()))
        };
        Self::new(name, arguments)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionCall {
    SearchProductRecommendation { product_query: String },
    EditCart { operation: String, product: String, amount: i64 },
    FinalizeOrder,
    Unrecognized { name: String },
}

#[derive(Deserialize)]
struct SearchArguments {
    product_query: String,
}

#[derive(Deserialize)]
struct EditCartArguments {
    operation: String,
    product: String,
    amount: Value,
}

impl ActionCall {
    pub fn decode(call: &RawToolCall) -> Result<Self, CommerceError> {
        match call.name.trim() {
            SEARCH_PRODUCT_RECOMMENDATION => {
                let arguments: SearchArguments = parse_arguments(&call.name, &call.arguments)?;
                Ok(Self::SearchProductRecommendation { product_query: arguments.product_query })
            }
            EDIT_CART => {
                let arguments: EditCartArguments = parse_arguments(&call.name, &call.arguments)?;
                let amount = whole_amount(&arguments.amount).ok_or_else(|| {
                    CommerceError::MalformedArguments {
                        action: call.name.clone(),
                        reason: format!("amount `{}` is not a whole number", arguments.amount),
                    }
                })?;
                Ok(Self::EditCart {
                    operation: arguments.operation,
                    product: arguments.product,
                    amount,
                })
            }
            FINALIZE_ORDER => Ok(Self::FinalizeOrder),
            _ => Ok(Self::Unrecognized { name: call.name.clone() }),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::SearchProductRecommendation { .. } => SEARCH_PRODUCT_RECOMMENDATION,
            Self::EditCart { .. } => EDIT_CART,
            Self::FinalizeOrder => FINALIZE_ORDER,
            Self::Unrecognized { name } => name,
        }
    }
}

fn parse_arguments<T>(action: &str, arguments: &Value) -> Result<T, CommerceError>
where
    T: for<'de> Deserialize<'de>,
{
    let malformed = |reason: String| CommerceError::MalformedArguments {
        action: action.to_string(),
        reason,
    };

    let decoded = match arguments {
        Value::String(encoded) => {
            serde_json::from_str::<Value>(encoded).map_err(|error| malformed(error.to_string()))?
        }
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };

    serde_json::from_value(decoded).map_err(|error| malformed(error.to_string()))
}

/// Models send amounts as integers, floats or numeric strings.
fn whole_amount(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number.as_f64().filter(|float| float.fract() == 0.0 && float.abs() < 1e15).map(|f| f as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Function definitions advertised to the chat model.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": FINALIZE_ORDER,
                "description": "Finalize the user's order",
                "parameters": {"type": "object", "properties": {}},
            },
        }),
        json!({
            "type": "function",
            "function": {
                "name": SEARCH_PRODUCT_RECOMMENDATION,
                "description": "Search the store catalog for sunglasses matching what the user wants, a previous purchase, or a specific product name.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "product_query": {
                            "type": "string",
                            "description": "Description of the desired sunglasses, e.g. 'polarized sport sunglasses'",
                        }
                    },
                    "required": ["product_query"],
                },
            },
        }),
        json!({
            "type": "function",
            "function": {
                "name": EDIT_CART,
                "description": "Add or remove units of a product in the user's cart. Edits are cumulative: each call applies to the cart left by the previous one.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "operation": {
                            "type": "string",
                            "description": "Either 'add' or 'remove'",
                        },
                        "product": {
                            "type": "string",
                            "description": "Name of the product to add or remove",
                        },
                        "amount": {
                            "type": "integer",
                            "description": "Number of units",
                        },
                    },
                    "required": ["operation", "product", "amount"],
                },
            },
        }),
    ]
}
