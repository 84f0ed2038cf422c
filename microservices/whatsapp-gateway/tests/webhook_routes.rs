//! Webhook endpoint tests driven through the router

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use whatsapp_gateway::{
    GatewayConfig, InMemoryMessageRepository, Message, MessageDirection, MessageRepository,
    MessageStatus, MessageType, WhatsAppGatewayService,
};

fn gateway(vars: &[(&str, &str)]) -> (Router, Arc<InMemoryMessageRepository>) {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let config = GatewayConfig::from_lookup(|key| map.get(key).cloned());
    let repository = Arc::new(InMemoryMessageRepository::new());

    let router = WhatsAppGatewayService::new(config)
        .unwrap()
        .with_repository(repository.clone())
        .router();
    (router, repository)
}

fn meta_gateway() -> (Router, Arc<InMemoryMessageRepository>) {
    gateway(&[
        ("WHATSAPP_PHONE_NUMBER_ID", "100"),
        ("WHATSAPP_ACCESS_TOKEN", "token"),
        ("WHATSAPP_VERIFY_TOKEN", "verify-me"),
    ])
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn cloud_notification() -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "waba-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "5511400000000",
                        "phone_number_id": "100"
                    },
                    "contacts": [{ "profile": { "name": "Maria" }, "wa_id": "5511999999999" }],
                    "messages": [
                        {
                            "from": "5511999999999", "id": "wamid.A", "timestamp": "1700000000",
                            "type": "text", "text": { "body": "Olá" }
                        },
                        {
                            "from": "5511999999999", "id": "wamid.B", "timestamp": "1700000005",
                            "type": "document",
                            "document": { "filename": "boleto.pdf", "mime_type": "application/pdf" }
                        }
                    ]
                }
            }]
        }]
    })
}

#[tokio::test]
async fn verify_echoes_challenge() {
    let (app, _) = meta_gateway();
    let response = app
        .oneshot(get(
            "/api/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=verify-me\
             &hub.challenge=challenge123",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "challenge123");
}

#[tokio::test]
async fn verify_rejects_wrong_token() {
    let (app, _) = meta_gateway();
    let response = app
        .oneshot(get(
            "/api/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=c",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");
}

#[tokio::test]
async fn verify_requires_all_parameters() {
    let (app, _) = meta_gateway();
    let response = app
        .oneshot(get("/api/webhook/whatsapp?hub.mode=subscribe&hub.challenge=c"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn verify_never_matches_unset_token() {
    let (app, _) = gateway(&[]);
    let response = app
        .oneshot(get(
            "/api/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=x&hub.challenge=c",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cloud_notification_is_stored() {
    let (app, repository) = meta_gateway();
    let response = app
        .oneshot(post_json("/api/webhook/whatsapp", &cloud_notification()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));

    let messages = repository.get_by_contact("5511999999999").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, "wamid.A");
    assert_eq!(messages[0].content, "Olá");
    assert_eq!(messages[0].to, "100");
    assert_eq!(messages[1].message_type, MessageType::Document);
    assert_eq!(messages[1].content, "boleto.pdf");
}

#[tokio::test]
async fn cloud_notification_applies_status_receipts() {
    let (app, repository) = meta_gateway();
    repository
        .save(Message::outgoing(
            "wamid.OUT",
            "100",
            "5511999999999",
            "Pedido enviado",
            MessageType::Text,
        ))
        .await
        .unwrap();

    let receipt = json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "waba-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "metadata": { "phone_number_id": "100" },
                    "statuses": [{
                        "id": "wamid.OUT", "status": "delivered",
                        "timestamp": "1700000010", "recipient_id": "5511999999999"
                    }]
                }
            }]
        }]
    });

    let response = app
        .oneshot(post_json("/api/webhook/whatsapp", &receipt))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = repository.get_by_id("wamid.OUT").await.unwrap().unwrap();
    assert_eq!(stored.status(), MessageStatus::Delivered);
}

#[tokio::test]
async fn wrong_object_is_rejected() {
    let (app, repository) = meta_gateway();
    let response = app
        .oneshot(post_json(
            "/api/webhook/whatsapp",
            &json!({ "object": "page", "entry": [] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "MALFORMED_PAYLOAD");
    assert!(repository.is_empty());
}

#[tokio::test]
async fn unparseable_body_is_acknowledged() {
    let (app, _) = meta_gateway();
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhook/whatsapp")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["error"], "internal error");
    assert_eq!(body["code"], "PROVIDER_ERROR");
}

#[tokio::test]
async fn evolution_event_is_stored() {
    let (app, repository) = gateway(&[
        ("WHATSAPP_PROVIDER", "evolution"),
        ("EVOLUTION_API_KEY", "key"),
        ("EVOLUTION_INSTANCE_NAME", "atendimento"),
    ]);

    let event = json!({
        "event": "messages.upsert",
        "instance": "atendimento",
        "data": {
            "key": {
                "id": "3EB0A1",
                "remoteJid": "5511988887777@s.whatsapp.net",
                "fromMe": false
            },
            "pushName": "João",
            "message": { "imageMessage": { "caption": "comprovante" } },
            "messageTimestamp": 1700000000
        }
    });

    let response = app
        .oneshot(post_json("/api/webhook/evolution", &event))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = repository.get_by_id("3EB0A1").await.unwrap().unwrap();
    assert_eq!(stored.from, "5511988887777");
    assert_eq!(stored.to, "atendimento");
    assert_eq!(stored.message_type, MessageType::Image);
    assert_eq!(stored.content, "comprovante");
}

#[tokio::test]
async fn evolution_echo_keeps_outgoing_message() {
    let (app, repository) = gateway(&[
        ("WHATSAPP_PROVIDER", "evolution"),
        ("EVOLUTION_API_KEY", "key"),
        ("EVOLUTION_INSTANCE_NAME", "atendimento"),
    ]);
    repository
        .save(Message::outgoing(
            "BAE5F1",
            "atendimento",
            "5511999999999",
            "Pedido confirmado",
            MessageType::Text,
        ))
        .await
        .unwrap();

    let echo = json!({
        "event": "messages.upsert",
        "instance": "atendimento",
        "data": {
            "key": {
                "id": "BAE5F1",
                "remoteJid": "5511999999999@s.whatsapp.net",
                "fromMe": true
            },
            "message": { "conversation": "Pedido confirmado" },
            "messageTimestamp": 1700000000
        }
    });

    let response = app
        .oneshot(post_json("/api/webhook/evolution", &echo))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = repository.get_by_id("BAE5F1").await.unwrap().unwrap();
    assert_eq!(stored.direction(), MessageDirection::Outgoing);
    assert_eq!(stored.status(), MessageStatus::Sent);
    assert_eq!(stored.from, "atendimento");
    assert_eq!(stored.to, "5511999999999");
}

#[tokio::test]
async fn evolution_event_without_data_is_rejected() {
    let (app, _) = gateway(&[("WHATSAPP_PROVIDER", "evolution")]);
    let response = app
        .oneshot(post_json(
            "/api/webhook/evolution",
            &json!({ "event": "messages.upsert" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn evolution_event_needs_evolution_provider() {
    let (app, repository) = meta_gateway();
    let event = json!({
        "event": "messages.upsert",
        "data": {
            "key": { "id": "3EB0A1", "remoteJid": "5511988887777@s.whatsapp.net" },
            "message": { "conversation": "oi" }
        }
    });

    let response = app
        .oneshot(post_json("/api/webhook/evolution", &event))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    assert!(repository.is_empty());
}

#[tokio::test]
async fn twilio_callback_is_stored() {
    let (app, repository) = gateway(&[
        ("WHATSAPP_PROVIDER", "twilio"),
        ("TWILIO_ACCOUNT_SID", "AC123"),
        ("TWILIO_AUTH_TOKEN", "tok"),
        ("TWILIO_WHATSAPP_NUMBER", "+14155238886"),
    ]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/webhook/twilio")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            "MessageSid=SM123&From=whatsapp%3A%2B5511999999999\
             &To=whatsapp%3A%2B14155238886&Body=Oi&NumMedia=0",
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/xml"
    );
    assert!(body_text(response).await.contains("<Response></Response>"));

    let stored = repository.get_by_id("SM123").await.unwrap().unwrap();
    assert_eq!(stored.from, "+5511999999999");
    assert_eq!(stored.content, "Oi");
}

#[tokio::test]
async fn chat_relay_events_are_acknowledged() {
    let (app, _) = gateway(&[]);
    for event in [
        json!({ "event": "status", "data": { "connected": true } }),
        json!({ "event": "qr", "data": { "qr": "2@abc", "available": true } }),
        json!({ "event": "typing", "data": { "chat": "5511" } }),
    ] {
        let response = app
            .clone()
            .oneshot(post_json("/api/webhook/chat-whatsapp", &event))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "status": "ok", "received": true })
        );
    }
}

#[tokio::test]
async fn chat_relay_message_event_is_stored() {
    let (app, repository) = gateway(&[]);
    let event = json!({
        "event": "message",
        "data": {
            "message": {
                "id": "false_5511999999999@c.us_3EB0",
                "from": "5511999999999",
                "to": "me",
                "content": "Bom dia",
                "type": "chat",
                "direction": "incoming",
                "timestamp": "2024-05-01T12:00:00.000Z",
                "status": "received"
            }
        }
    });

    let response = app
        .oneshot(post_json("/api/webhook/chat-whatsapp", &event))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = repository
        .get_by_id("false_5511999999999@c.us_3EB0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.direction(), MessageDirection::Incoming);
    assert_eq!(stored.content, "Bom dia");
}

#[tokio::test]
async fn chat_relay_webhook_requires_event_and_data() {
    let (app, _) = gateway(&[]);
    let response = app
        .oneshot(post_json(
            "/api/webhook/chat-whatsapp",
            &json!({ "event": "status" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "MALFORMED_PAYLOAD");
}

#[tokio::test]
async fn chat_relay_message_without_body_is_acknowledged() {
    let (app, repository) = gateway(&[]);
    let response = app
        .oneshot(post_json(
            "/api/webhook/chat-whatsapp",
            &json!({ "event": "message", "data": { "chat": "5511" } }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["error"], "internal error");
    assert!(repository.is_empty());
}
