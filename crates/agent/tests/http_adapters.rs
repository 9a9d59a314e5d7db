use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{json, Value};
use vitrine_agent::llm::{ChatMessage, ChatRequest, LlmClient, LlmError, OpenAiChatClient};
use vitrine_agent::payment::{MercadoPagoGateway, PaymentError, PaymentGateway};
use vitrine_agent::tools::{tool_definitions, RawToolCall};
use vitrine_core::domain::cart::{CartLine, UNIT_VOLUME_LITERS};
use vitrine_core::domain::conversation::ConversationId;

struct CapturedRequest {
    request_line: String,
    headers: String,
    body: Value,
}

/// Serves exactly one canned response and hands back what the client sent.
fn spawn_single_response_server(
    status: u16,
    body: String,
) -> (String, mpsc::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let address = listener.local_addr().expect("listener addr");
    let (sender, receiver) = mpsc::channel();

    thread::spawn(move || {
        let (mut socket, _) = listener.accept().expect("accept");
        let mut raw = Vec::new();
        let mut buffer = [0_u8; 8192];
        let header_end = loop {
            let read = socket.read(&mut buffer).expect("read request");
            raw.extend_from_slice(&buffer[..read]);
            if let Some(position) = raw.windows(4).position(|window| window == b"\r\n\r\n") {
                break position + 4;
            }
            assert!(read > 0, "connection closed before headers ended");
        };

        let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        while raw.len() < header_end + content_length {
            let read = socket.read(&mut buffer).expect("read body");
            assert!(read > 0, "connection closed before body ended");
            raw.extend_from_slice(&buffer[..read]);
        }

        let status_text = match status {
            200 => "OK",
            201 => "Created",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "OK",
        };
        let response = format!(
            "HTTP/1.1 {status} {status_text}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).expect("write response");

        let body_bytes = &raw[header_end..header_end + content_length];
        let _ = sender.send(CapturedRequest {
            request_line: head.lines().next().unwrap_or_default().to_string(),
            headers: head.to_lowercase(),
            body: serde_json::from_slice(body_bytes).unwrap_or(Value::Null),
        });
    });

    (format!("http://{address}"), receiver)
}

fn received(receiver: &mpsc::Receiver<CapturedRequest>) -> CapturedRequest {
    receiver.recv_timeout(Duration::from_secs(5)).expect("captured request")
}

fn gateway(base_url: &str) -> MercadoPagoGateway {
    MercadoPagoGateway::new(
        base_url,
        Some(SecretString::from("TEST-token".to_string())),
        "https://shop.example/v1/webhooks/payment",
        Duration::from_secs(5),
    )
    .expect("gateway")
}

fn lines() -> Vec<CartLine> {
    vec![CartLine {
        product_name: "Persol 714 Marrón".to_string(),
        number_of_units: 2,
        price_per_unit: Decimal::new(34_999, 2),
        volume_per_unit: UNIT_VOLUME_LITERS,
    }]
}

#[tokio::test]
async fn preference_is_created_with_bearer_auth_and_reference() {
    let (base_url, receiver) = spawn_single_response_server(
        201,
        json!({
            "id": "pref-123",
            "init_point": "https://mp.example/checkout?pref_id=pref-123",
            "sandbox_init_point": "https://sandbox.mp.example/checkout?pref_id=pref-123"
        })
        .to_string(),
    );

    let preference = gateway(&base_url)
        .create_preference(&ConversationId("5511999".to_string()), &lines(), "12345678")
        .await
        .expect("preference");

    assert_eq!(preference.preference_id, "pref-123");
    assert_eq!(preference.checkout_url, "https://mp.example/checkout?pref_id=pref-123");
    assert_eq!(preference.total_amount, Decimal::new(69_998, 2));

    let request = received(&receiver);
    assert!(request.request_line.starts_with("POST /checkout/preferences"));
    assert!(request.headers.contains("authorization: bearer test-token"));
    assert_eq!(request.body["external_reference"], "opticasolar_5511999");
    assert_eq!(request.body["items"][0]["title"], "Persol 714 Marrón");
    assert_eq!(request.body["items"][0]["quantity"], 2);
    assert_eq!(request.body["items"][0]["currency_id"], "ARS");
    assert_eq!(request.body["notification_url"], "https://shop.example/v1/webhooks/payment");
}

#[tokio::test]
async fn rejected_preference_reports_the_status_code() {
    let (base_url, _receiver) =
        spawn_single_response_server(400, json!({"message": "invalid items"}).to_string());

    let error = gateway(&base_url)
        .create_preference(&ConversationId("5511999".to_string()), &lines(), "12345678")
        .await
        .expect_err("rejected");

    assert_eq!(error, PaymentError::Api { status: 400 });
}

#[tokio::test]
async fn webhook_looks_up_the_payment_status() {
    let (base_url, receiver) = spawn_single_response_server(
        200,
        json!({
            "status": "approved",
            "status_detail": "accredited",
            "transaction_amount": 699.98,
            "currency_id": "ARS",
            "external_reference": "opticasolar_5511999"
        })
        .to_string(),
    );

    let outcome = gateway(&base_url).handle_webhook(&json!({"type": "payment", "data": {"id": 987654}})).await;

    assert!(outcome.is_approved());
    assert_eq!(outcome.message, "Payment approved, order processed");
    assert_eq!(outcome.payment_id.as_deref(), Some("987654"));
    assert_eq!(outcome.external_reference.as_deref(), Some("opticasolar_5511999"));
    assert!(received(&receiver).request_line.starts_with("GET /v1/payments/987654"));
}

#[tokio::test]
async fn missing_payment_returns_an_unsuccessful_outcome() {
    let (base_url, _receiver) = spawn_single_response_server(404, json!({"message": "not found"}).to_string());

    let outcome = gateway(&base_url).handle_webhook(&json!({"data": {"id": "42"}})).await;

    assert!(!outcome.success);
    assert!(!outcome.is_approved());
    assert_eq!(outcome.payment_id.as_deref(), Some("42"));
}

fn chat_client(base_url: &str) -> OpenAiChatClient {
    OpenAiChatClient::new(
        base_url,
        "gpt-4o-mini",
        Some(&SecretString::from("sk-test".to_string())),
        Duration::from_secs(5),
        0,
    )
    .expect("client")
}

#[tokio::test]
async fn chat_completion_decodes_tool_calls_in_order() {
    let (base_url, receiver) = spawn_single_response_server(
        200,
        json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {
                            "id": "call_1",
                            "type": "function",
                            "function": {
                                "name": "edit_cart",
                                "arguments": "{\"operation\":\"add\",\"product\":\"Persol 714 Marrón\",\"amount\":2}"
                            }
                        },
                        {
                            "id": "call_2",
                            "type": "function",
                            "function": {"name": "finalize_order", "arguments": ""}
                        }
                    ]
                }
            }]
        })
        .to_string(),
    );

    let completion = chat_client(&base_url)
        .complete(ChatRequest {
            messages: vec![ChatMessage::system("sell sunglasses"), ChatMessage::user("add two and pay")],
            tools: tool_definitions(),
            json_mode: false,
        })
        .await
        .expect("completion");

    assert_eq!(completion.content, None);
    assert_eq!(
        completion.tool_calls,
        vec![
            RawToolCall::new(
                "edit_cart",
                json!({"operation": "add", "product": "Persol 714 Marrón", "amount": 2})
            ),
            RawToolCall::new("finalize_order", json!({})),
        ]
    );

    let request = received(&receiver);
    assert!(request.request_line.starts_with("POST /chat/completions"));
    assert!(request.headers.contains("authorization: bearer sk-test"));
    assert_eq!(request.body["model"], "gpt-4o-mini");
    assert_eq!(request.body["tool_choice"], "auto");
    assert_eq!(request.body["tools"].as_array().map(Vec::len), Some(3));
    assert_eq!(request.body["messages"][1]["content"], "add two and pay");
}

#[tokio::test]
async fn server_errors_surface_status_and_body() {
    let (base_url, _receiver) = spawn_single_response_server(500, "{\"error\":\"overloaded\"}".to_string());

    let error = chat_client(&base_url)
        .complete(ChatRequest { messages: vec![ChatMessage::user("hola")], ..ChatRequest::default() })
        .await
        .expect_err("server error");

    match error {
        LlmError::Response { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("overloaded"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
