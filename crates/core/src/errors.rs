use thiserror::Error;

use crate::domain::cart::INVALID_OPERATION_MESSAGE;

pub const SYSTEM_UNAVAILABLE_MESSAGE: &str =
    "The system is temporarily unavailable. Please try again in a few minutes.";

/// Business failures raised while executing a model-declared action. All of
/// them are recoverable within the conversation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommerceError {
    #[error("product `{product}` was never recommended in this conversation")]
    UnknownProduct { product: String },
    #[error("cart is empty")]
    EmptyCart,
    #[error("unsupported cart operation `{operation}`")]
    InvalidOperation { operation: String },
    #[error("invalid unit amount {amount}")]
    InvalidAmount { amount: i64 },
    #[error("product search unavailable: {0}")]
    SearchUnavailable(String),
    #[error("payment unavailable: {0}")]
    PaymentUnavailable(String),
    #[error("MercadoPago API error: {status}")]
    PaymentApiError { status: u16 },
    #[error("payment network failure: {0}")]
    PaymentNetworkError(String),
    #[error("malformed arguments for `{action}`: {reason}")]
    MalformedArguments { action: String, reason: String },
}

impl CommerceError {
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownProduct { product } => format!(
                "I could not find \"{product}\" among the products recommended to you. Please search for it first."
            ),
            Self::EmptyCart => {
                "Your cart is empty, there is nothing to finalize. Add some products first.".to_owned()
            }
            Self::InvalidOperation { .. } => INVALID_OPERATION_MESSAGE.to_owned(),
            Self::InvalidAmount { .. } => {
                "The number of units must be a positive whole number.".to_owned()
            }
            Self::SearchUnavailable(_) => {
                "The product search is temporarily unavailable. Please try again in a few minutes."
                    .to_owned()
            }
            Self::PaymentUnavailable(reason) => {
                format!("Online payment is not available right now: {reason}")
            }
            Self::PaymentApiError { status } => format!(
                "We could not create your payment link (MercadoPago API error: {status}). Please try again later."
            ),
            Self::PaymentNetworkError(_) => {
                "We could not reach the payment provider. Please try again in a few minutes."
                    .to_owned()
            }
            Self::MalformedArguments { .. } => {
                "Sorry, I could not understand that request. Could you rephrase it?".to_owned()
            }
        }
    }

    /// Stable snake_case kind for logs and JSON envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownProduct { .. } => "unknown_product",
            Self::EmptyCart => "empty_cart",
            Self::InvalidOperation { .. } => "invalid_operation",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::SearchUnavailable(_) => "search_unavailable",
            Self::PaymentUnavailable(_) => "payment_unavailable",
            Self::PaymentApiError { .. } => "payment_api_error",
            Self::PaymentNetworkError(_) => "payment_network_error",
            Self::MalformedArguments { .. } => "malformed_arguments",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Commerce(#[from] CommerceError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("conversation `{0}` is busy")]
    Busy(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => {
                "Another message for this conversation is still being processed. Please retry shortly."
            }
            Self::ServiceUnavailable { .. } => SYSTEM_UNAVAILABLE_MESSAGE,
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Commerce(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Busy(conversation_id) => Self::Conflict {
                message: format!("conversation `{conversation_id}` has a turn in flight"),
                correlation_id,
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
