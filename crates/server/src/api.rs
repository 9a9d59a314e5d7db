//! JSON endpoints used by the dialogue layer and the payment provider.
//!
//! - `POST /v1/turns`                         run one user message end to end
//! - `POST /v1/dispatch`                      run calls planned by the caller
//! - `GET  /v1/conversations/{id}/cart`       current cart and its summary
//! - `POST /v1/conversations/{id}/reset`      forget a conversation
//! - `POST /v1/webhooks/payment`              payment notifications

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;
use vitrine_agent::dispatcher::TurnContext;
use vitrine_agent::payment::WebhookOutcome;
use vitrine_agent::runtime::{AgentRuntime, TurnOutcome, TurnReply};
use vitrine_agent::tools::RawToolCall;
use vitrine_core::checkout::render_cart_summary;
use vitrine_core::domain::cart::CartLine;
use vitrine_core::domain::conversation::ConversationId;
use vitrine_core::errors::{ApplicationError, InterfaceError};

use crate::signature::{self, SignatureCheck, SIGNATURE_HEADER};

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<AgentRuntime>,
    webhook_secret: Option<Arc<SecretString>>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub conversation_id: String,
    pub message: String,
    #[serde(flatten)]
    pub context: TurnContext,
}

#[derive(Debug, Deserialize)]
pub struct CallRequest {
    pub name: String,
    /// Either a JSON object or the JSON-encoded string a chat model emits.
    #[serde(default)]
    pub arguments: Value,
}

impl CallRequest {
    fn into_raw(self) -> RawToolCall {
        match self.arguments {
            Value::String(encoded) => RawToolCall::from_encoded(self.name, &encoded),
            Value::Null => RawToolCall::new(self.name, Value::Object(Default::default())),
            arguments => RawToolCall::new(self.name, arguments),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub calls: Vec<CallRequest>,
    #[serde(flatten)]
    pub context: TurnContext,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub conversation_id: String,
    pub lines: Vec<CartLine>,
    pub total_value: Decimal,
    pub total_volume: Decimal,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn router(runtime: Arc<AgentRuntime>, webhook_secret: Option<SecretString>) -> Router {
    Router::new()
        .route("/v1/turns", post(post_turn))
        .route("/v1/dispatch", post(post_dispatch))
        .route("/v1/conversations/{id}/cart", get(get_cart))
        .route("/v1/conversations/{id}/reset", post(reset_conversation))
        .route("/v1/webhooks/payment", post(payment_webhook))
        .with_state(ApiState { runtime, webhook_secret: webhook_secret.map(Arc::new) })
}

async fn post_turn(
    State(state): State<ApiState>,
    Json(body): Json<TurnRequest>,
) -> ApiResult<Response> {
    let id = conversation_id(&body.conversation_id)?;
    let reply = state.runtime.handle_turn(&body.message, &id, &body.context).await;
    Ok(turn_response(&id, reply))
}

async fn post_dispatch(
    State(state): State<ApiState>,
    Json(body): Json<DispatchRequest>,
) -> ApiResult<Response> {
    let id = conversation_id(&body.conversation_id)?;
    let calls: Vec<RawToolCall> = body.calls.into_iter().map(CallRequest::into_raw).collect();
    let reply = state.runtime.dispatch(&id, &calls, &body.context).await;
    Ok(turn_response(&id, reply))
}

async fn get_cart(
    Path(raw_id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<CartView>> {
    let id = conversation_id(&raw_id)?;
    let cart = state.runtime.dispatcher().cart().get_cart(&id).await.map_err(interface_error)?;

    Ok(Json(CartView {
        conversation_id: id.0,
        total_value: cart.total_value(),
        total_volume: cart.total_volume(),
        summary: render_cart_summary(&cart),
        lines: cart.lines().to_vec(),
    }))
}

async fn reset_conversation(
    Path(raw_id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<StatusCode> {
    let id = conversation_id(&raw_id)?;
    state.runtime.reset(&id).await.map_err(interface_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn payment_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookOutcome>> {
    if let Some(secret) = &state.webhook_secret {
        let header = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
        let check = signature::verify(secret, header, &body);
        if check != SignatureCheck::Valid {
            warn!(event_name = "webhook.signature.rejected", check = ?check, "payment webhook signature rejected");
            return Err(api_error(StatusCode::UNAUTHORIZED, "invalid webhook signature"));
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|error| api_error(StatusCode::BAD_REQUEST, &format!("invalid webhook payload: {error}")))?;
    let outcome = state.runtime.confirm_payment(&payload).await.map_err(interface_error)?;

    info!(
        event_name = "webhook.payment.processed",
        success = outcome.success,
        status = outcome.status.as_deref().unwrap_or("unknown"),
        "payment webhook processed"
    );
    Ok(Json(outcome))
}

/// Busy and unavailable turns still carry their user-facing fragments.
fn turn_response(id: &ConversationId, reply: TurnReply) -> Response {
    let status = match reply.outcome {
        TurnOutcome::Completed | TurnOutcome::Rejected => StatusCode::OK,
        TurnOutcome::Busy => StatusCode::CONFLICT,
        TurnOutcome::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    };
    info!(
        event_name = "api.turn.completed",
        conversation_id = %id,
        outcome = ?reply.outcome,
        fragments = reply.fragments.len(),
        "turn answered"
    );
    (status, Json(reply)).into_response()
}

fn conversation_id(raw: &str) -> ApiResult<ConversationId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "conversation_id is required"));
    }
    Ok(ConversationId(trimmed.to_string()))
}

fn interface_error(error: ApplicationError) -> (StatusCode, Json<ApiError>) {
    let interface = error.into_interface(Uuid::new_v4().to_string());
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "api.request.failed",
        correlation_id = interface.correlation_id(),
        error = %interface,
        "request failed"
    );
    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

fn api_error(status: StatusCode, message: &str) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError { error: message.to_string(), correlation_id: Uuid::new_v4().to_string() }))
}
