use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};

use vitrine_core::config::PaymentConfig;
use vitrine_core::domain::cart::CartLine;
use vitrine_core::domain::conversation::ConversationId;

pub const STORE_TAG: &str = "opticasolar";
const STORE_SITE: &str = "https://opticasolar.com";
const CURRENCY_ID: &str = "ARS";

/// `external_reference` sent with every preference; links a payment back to
/// its conversation.
pub fn external_reference(id: &ConversationId) -> String {
    format!("{STORE_TAG}_{id}")
}

pub fn conversation_from_reference(reference: &str) -> Option<ConversationId> {
    reference
        .strip_prefix(STORE_TAG)
        .and_then(|rest| rest.strip_prefix('_'))
        .filter(|id| !id.is_empty())
        .map(|id| ConversationId(id.to_string()))
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("MercadoPago access token not configured")]
    NotConfigured,
    #[error("MercadoPago API error: {status}")]
    Api { status: u16 },
    #[error("Error creating payment preference: {0}")]
    Preference(String),
    #[error("Error getting payment status: {0}")]
    Status(String),
    #[error("No payment ID in webhook data")]
    MissingPaymentId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Preference {
    pub preference_id: String,
    pub checkout_url: String,
    pub sandbox_checkout_url: Option<String>,
    pub total_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub transaction_amount: Option<Decimal>,
    #[serde(default)]
    pub currency_id: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_amount: Option<Decimal>,
}

impl WebhookOutcome {
    pub fn is_approved(&self) -> bool {
        self.success && self.status.as_deref() == Some("approved")
    }

    fn failure(message: String, payment_id: Option<String>) -> Self {
        Self { success: false, message, payment_id, ..Self::default() }
    }
}

/// Payment collaborator. Webhook handling is shared: it only needs the
/// status lookup.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_preference(
        &self,
        id: &ConversationId,
        lines: &[CartLine],
        zipcode: &str,
    ) -> Result<Preference, PaymentError>;

    async fn get_status(&self, payment_id: &str) -> Result<PaymentStatus, PaymentError>;

    async fn handle_webhook(&self, payload: &Value) -> WebhookOutcome {
        let Some(payment_id) = webhook_payment_id(payload) else {
            return WebhookOutcome::failure(PaymentError::MissingPaymentId.to_string(), None);
        };

        match self.get_status(&payment_id).await {
            Ok(payment) => {
                let message = match payment.status.as_str() {
                    "approved" => "Payment approved, order processed".to_string(),
                    "rejected" => "Payment rejected".to_string(),
                    other => format!("Payment status: {other}"),
                };
                WebhookOutcome {
                    success: true,
                    status: Some(payment.status),
                    message,
                    payment_id: Some(payment_id),
                    external_reference: payment.external_reference,
                    transaction_amount: payment.transaction_amount,
                }
            }
            Err(error) => WebhookOutcome::failure(error.to_string(), Some(payment_id)),
        }
    }
}

/// `data.id` arrives as a string or a number depending on the notification
/// type.
pub fn webhook_payment_id(payload: &Value) -> Option<String> {
    match payload.get("data")?.get("id")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

pub fn cart_total(lines: &[CartLine]) -> Decimal {
    lines.iter().map(CartLine::line_total).sum::<Decimal>().round_dp(2)
}

#[derive(Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
    #[serde(default)]
    sandbox_init_point: Option<String>,
}

pub struct MercadoPagoGateway {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<SecretString>,
    notification_url: String,
}

impl MercadoPagoGateway {
    pub fn new(
        base_url: &str,
        access_token: Option<SecretString>,
        notification_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| PaymentError::Preference(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.filter(|token| !token.expose_secret().trim().is_empty()),
            notification_url: notification_url.into(),
        })
    }

    pub fn from_config(config: &PaymentConfig) -> Result<Self, PaymentError> {
        Self::new(
            &config.base_url,
            config.access_token.clone(),
            config.notification_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn token(&self) -> Result<&str, PaymentError> {
        self.access_token
            .as_ref()
            .map(|token| token.expose_secret())
            .ok_or(PaymentError::NotConfigured)
    }

    pub fn preference_payload(&self, id: &ConversationId, lines: &[CartLine], zipcode: &str) -> Value {
        let items: Vec<Value> = lines
            .iter()
            .map(|line| {
                json!({
                    "title": line.product_name,
                    "quantity": line.number_of_units,
                    "unit_price": line.price_per_unit.to_f64().unwrap_or_default(),
                    "currency_id": CURRENCY_ID,
                })
            })
            .collect();

        json!({
            "items": items,
            "payer": {
                "name": "Cliente",
                "email": format!("cliente_{id}@{STORE_TAG}.com"),
            },
            "back_urls": {
                "success": format!("{STORE_SITE}/success"),
                "failure": format!("{STORE_SITE}/failure"),
                "pending": format!("{STORE_SITE}/pending"),
            },
            "auto_return": "approved",
            "external_reference": external_reference(id),
            "notification_url": self.notification_url,
            "metadata": {
                "user_id": id.0,
                "zipcode": zipcode,
                "store": STORE_TAG,
            },
        })
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    async fn create_preference(
        &self,
        id: &ConversationId,
        lines: &[CartLine],
        zipcode: &str,
    ) -> Result<Preference, PaymentError> {
        let token = self.token()?;
        let payload = self.preference_payload(id, lines, zipcode);

        let response = self
            .http
            .post(format!("{}/checkout/preferences", self.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                error!(
                    event_name = "payment.preference.transport_failed",
                    conversation_id = %id,
                    error = %error,
                    "failed to reach MercadoPago"
                );
                PaymentError::Preference(error.to_string())
            })?;

        if response.status() != StatusCode::CREATED {
            let status = response.status().as_u16();
            error!(
                event_name = "payment.preference.rejected",
                conversation_id = %id,
                status,
                "MercadoPago rejected the preference"
            );
            return Err(PaymentError::Api { status });
        }

        let preference: PreferenceResponse =
            response.json().await.map_err(|error| PaymentError::Preference(error.to_string()))?;
        info!(
            event_name = "payment.preference.created",
            conversation_id = %id,
            preference_id = %preference.id,
            "payment preference created"
        );

        Ok(Preference {
            preference_id: preference.id,
            checkout_url: preference.init_point,
            sandbox_checkout_url: preference.sandbox_init_point,
            total_amount: cart_total(lines),
        })
    }

    async fn get_status(&self, payment_id: &str) -> Result<PaymentStatus, PaymentError> {
        let token = self.token()?;
        if payment_id.is_empty() || !payment_id.chars().all(|character| character.is_ascii_alphanumeric()) {
            return Err(PaymentError::Status(format!("invalid payment id `{payment_id}`")));
        }

        let response = self
            .http
            .get(format!("{}/v1/payments/{payment_id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|error| PaymentError::Status(error.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(PaymentError::Status(response.status().as_u16().to_string()));
        }

        response.json().await.map_err(|error| PaymentError::Status(error.to_string()))
    }
}
