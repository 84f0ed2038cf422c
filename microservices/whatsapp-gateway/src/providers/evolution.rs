//! Evolution API relay provider
//!
//! Evolution drives a WhatsApp Web session and exposes a REST API per
//! instance. Besides the Cloud API shaped webhook it emits its own event
//! format, handled by [`EvolutionProvider::process_evolution_webhook`].

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::{debug, error};

use super::{
    verify_subscription, with_country_code, AdapterError, AdapterResult, ProviderKind,
    WhatsAppProvider,
};
use crate::config::EvolutionConfig;
use crate::model::{Message, SendMessageParams, WhatsAppMessageResponse};
use crate::normalize::{classify, parse_unix_seconds, EVOLUTION_FIELDS};
use crate::payload::{EvolutionWebhook, EVOLUTION_MESSAGES_UPSERT};

static FALLBACK_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct EvolutionProvider {
    config: EvolutionConfig,
    http_client: reqwest::Client,
}

impl EvolutionProvider {
    pub fn new(config: EvolutionConfig) -> AdapterResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AdapterError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Digits with the default country code, e.g. `5511999999999`
    pub fn format_phone_number(phone: &str) -> String {
        with_country_code(phone)
    }

    pub fn instance_name(&self) -> &str {
        &self.config.instance_name
    }

    fn send_text_url(&self) -> String {
        format!(
            "{}/message/sendText/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.instance_name
        )
    }

    /// `evolution_<unix-millis>_<seq>`, unique within the process
    fn fallback_id() -> String {
        let seq = FALLBACK_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("evolution_{}_{}", Utc::now().timestamp_millis(), seq)
    }

    /// Normalize a native Evolution event. Only `messages.upsert` events that
    /// carry both a key and a message, and were not sent by this instance,
    /// produce a message.
    pub fn process_evolution_webhook(&self, payload: &EvolutionWebhook) -> Vec<Message> {
        if payload.event != EVOLUTION_MESSAGES_UPSERT {
            debug!(event = %payload.event, "Ignoring Evolution event");
            return Vec::new();
        }

        let Some(data) = payload.data.as_ref() else {
            return Vec::new();
        };
        let (Some(key), Some(message)) = (data.key.as_ref(), data.message.as_ref()) else {
            debug!("Evolution upsert without key or message");
            return Vec::new();
        };

        // Echo of a message this instance sent; it is already stored as outgoing
        if key.from_me == Some(true) {
            debug!(message_id = ?key.id, "Ignoring Evolution upsert sent by this instance");
            return Vec::new();
        }

        let classified = classify(message, &EVOLUTION_FIELDS);

        // remoteJid looks like 5511999999999@s.whatsapp.net
        let from = key
            .remote_jid
            .as_deref()
            .and_then(|jid| jid.split('@').next())
            .unwrap_or_default()
            .to_string();

        let id = key
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(Self::fallback_id);

        let timestamp =
            parse_unix_seconds(data.message_timestamp.as_ref()).unwrap_or_else(Utc::now);

        vec![Message::incoming(
            id,
            from,
            self.config.instance_name.clone(),
            classified.content,
            classified.message_type,
            timestamp,
        )]
    }
}

/// Message id from a sendText response: `key.id`, then `messageId`
fn response_message_id(body: &Value) -> Option<String> {
    body.pointer("/key/id")
        .or_else(|| body.get("messageId"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// The `message` field of an Evolution error body
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("message")? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl WhatsAppProvider for EvolutionProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Evolution
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.expose_secret().is_empty() && !self.config.instance_name.is_empty()
    }

    fn sender_address(&self) -> String {
        self.config.instance_name.clone()
    }

    async fn send_message(
        &self,
        params: &SendMessageParams,
    ) -> AdapterResult<WhatsAppMessageResponse> {
        if !self.is_configured() {
            return Err(AdapterError::Configuration(
                "Evolution API credentials not configured: \
                 EVOLUTION_API_KEY, EVOLUTION_INSTANCE_NAME"
                    .to_string(),
            ));
        }
        params.validate()?;

        let to_number = Self::format_phone_number(&params.to);
        debug!(instance = %self.config.instance_name, "Sending Evolution API message");

        let response = self
            .http_client
            .post(self.send_text_url())
            .header("apikey", self.config.api_key.expose_secret())
            .json(&json!({
                "number": to_number,
                "text": params.message,
            }))
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        if status.is_success() {
            // Response shape varies across Evolution versions; an empty body is accepted
            let body: Value = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).map_err(|e| AdapterError::Parse(e.to_string()))?
            };
            let message_id = response_message_id(&body).unwrap_or_else(Self::fallback_id);
            Ok(WhatsAppMessageResponse::relayed(to_number, message_id))
        } else {
            let reason = error_message(&text).unwrap_or_else(|| text.clone());
            error!(status = status.as_u16(), reason = %reason, "Evolution API rejected message");
            Err(AdapterError::Provider {
                status: status.as_u16(),
                body: text,
            })
        }
    }

    fn verify_webhook(&self, mode: &str, token: &str, challenge: &str) -> Option<String> {
        verify_subscription(&self.config.verify_token, mode, token, challenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageType;
    use crate::normalize::VIDEO_PLACEHOLDER;
    use secrecy::Secret;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn config(base: &str, api_key: &str) -> EvolutionConfig {
        EvolutionConfig {
            api_url: base.to_string(),
            api_key: Secret::new(api_key.to_string()),
            instance_name: "atendimento".to_string(),
            verify_token: Secret::new("verify-me".to_string()),
            timeout: Duration::from_secs(5),
        }
    }

    fn provider() -> EvolutionProvider {
        EvolutionProvider::new(config("http://localhost:8080", "key")).unwrap()
    }

    fn webhook(value: Value) -> EvolutionWebhook {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_format_phone_number() {
        assert_eq!(EvolutionProvider::format_phone_number("11 99999-9999"), "5511999999999");
        let once = EvolutionProvider::format_phone_number("+55 11 99999-9999");
        assert_eq!(EvolutionProvider::format_phone_number(&once), once);
        assert_eq!(
            EvolutionProvider::format_phone_number("+5511999999999"),
            EvolutionProvider::format_phone_number("5511999999999")
        );
    }

    #[test]
    fn test_native_conversation_message() {
        let payload = webhook(json!({
            "event": "messages.upsert",
            "data": {
                "key": { "id": "abc", "remoteJid": "551199@s.whatsapp.net" },
                "message": { "conversation": "hi" },
                "messageTimestamp": 1700000000
            }
        }));

        let messages = provider().process_evolution_webhook(&payload);
        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.id, "abc");
        assert_eq!(msg.from, "551199");
        assert_eq!(msg.to, "atendimento");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.message_type, MessageType::Text);
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_native_text_beats_image() {
        let payload = webhook(json!({
            "event": "messages.upsert",
            "data": {
                "key": { "id": "abc", "remoteJid": "551199@s.whatsapp.net" },
                "message": {
                    "imageMessage": { "caption": "foto" },
                    "extendedTextMessage": { "text": "veja" }
                },
                "messageTimestamp": "1700000000"
            }
        }));
        let messages = provider().process_evolution_webhook(&payload);
        assert_eq!(messages[0].message_type, MessageType::Text);
        assert_eq!(messages[0].content, "veja");
    }

    #[test]
    fn test_native_video_and_fallbacks() {
        let payload = webhook(json!({
            "event": "messages.upsert",
            "data": {
                "key": { "remoteJid": "5511988887777@s.whatsapp.net" },
                "message": { "videoMessage": { "seconds": 12 } }
            }
        }));
        let messages = provider().process_evolution_webhook(&payload);
        assert_eq!(messages[0].message_type, MessageType::Video);
        assert_eq!(messages[0].content, VIDEO_PLACEHOLDER);
        assert!(messages[0].id.starts_with("evolution_"));
        assert_eq!(messages[0].from, "5511988887777");
    }

    #[test]
    fn test_native_ignores_other_events_and_incomplete_data() {
        let update = webhook(json!({ "event": "connection.update", "data": { "state": "open" } }));
        assert!(provider().process_evolution_webhook(&update).is_empty());

        let no_message = webhook(json!({
            "event": "messages.upsert",
            "data": { "key": { "id": "abc", "remoteJid": "551199@s.whatsapp.net" } }
        }));
        assert!(provider().process_evolution_webhook(&no_message).is_empty());
    }

    #[test]
    fn test_response_message_id() {
        assert_eq!(
            response_message_id(&json!({ "key": { "id": "3EB0" } })).as_deref(),
            Some("3EB0")
        );
        assert_eq!(
            response_message_id(&json!({ "messageId": "m-1" })).as_deref(),
            Some("m-1")
        );
        assert_eq!(response_message_id(&json!({ "status": "PENDING" })), None);
    }

    #[tokio::test]
    async fn test_send_without_api_key_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let provider = EvolutionProvider::new(config(&server.uri(), "")).unwrap();
        let result = provider
            .send_message(&SendMessageParams::text("11999999999", "oi"))
            .await;
        assert!(matches!(result, Err(AdapterError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_send_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/atendimento"))
            .and(header("apikey", "key-1"))
            .and(body_json(json!({ "number": "5511999999999", "text": "oi" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "key": {
                    "remoteJid": "5511999999999@s.whatsapp.net",
                    "fromMe": true,
                    "id": "BAE5F1"
                },
                "status": "PENDING"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = EvolutionProvider::new(config(&server.uri(), "key-1")).unwrap();
        let response = provider
            .send_message(&SendMessageParams::text("11 99999-9999", "oi"))
            .await
            .unwrap();

        assert_eq!(response.first_message_id(), Some("BAE5F1"));
        assert_eq!(response.first_wa_id(), Some("5511999999999"));
    }

    #[tokio::test]
    async fn test_send_error_keeps_full_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "status": 404,
                "error": "Not Found",
                "message": "The \"atendimento\" instance does not exist"
            })))
            .mount(&server)
            .await;

        let provider = EvolutionProvider::new(config(&server.uri(), "key-1")).unwrap();
        let err = provider
            .send_message(&SendMessageParams::text("5511999999999", "oi"))
            .await
            .unwrap_err();

        match err {
            AdapterError::Provider { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("does not exist"));
                assert!(body.contains("Not Found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"status":400,"message":"number invalid"}"#).as_deref(),
            Some("number invalid")
        );
        assert_eq!(
            error_message(r#"{"message":["exists: false"]}"#).as_deref(),
            Some(r#"["exists: false"]"#)
        );
        assert_eq!(error_message("Bad Gateway"), None);
    }

    #[tokio::test]
    async fn test_send_rejects_non_json_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let provider = EvolutionProvider::new(config(&server.uri(), "key-1")).unwrap();
        let err = provider
            .send_message(&SendMessageParams::text("5511999999999", "oi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
    }

    #[tokio::test]
    async fn test_send_empty_success_body_uses_fallback_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let provider = EvolutionProvider::new(config(&server.uri(), "key-1")).unwrap();
        let response = provider
            .send_message(&SendMessageParams::text("5511999999999", "oi"))
            .await
            .unwrap();
        assert!(response.first_message_id().unwrap().starts_with("evolution_"));
    }

    #[test]
    fn test_fallback_ids_are_unique() {
        let first = EvolutionProvider::fallback_id();
        let second = EvolutionProvider::fallback_id();
        assert_ne!(first, second);
        assert!(first.starts_with("evolution_"));
    }

    #[test]
    fn test_native_ignores_own_messages() {
        let payload = webhook(json!({
            "event": "messages.upsert",
            "data": {
                "key": {
                    "id": "BAE5F1",
                    "remoteJid": "5511999999999@s.whatsapp.net",
                    "fromMe": true
                },
                "message": { "conversation": "oi" }
            }
        }));
        assert!(provider().process_evolution_webhook(&payload).is_empty());

        let inbound = webhook(json!({
            "event": "messages.upsert",
            "data": {
                "key": {
                    "id": "3EB0",
                    "remoteJid": "5511999999999@s.whatsapp.net",
                    "fromMe": false
                },
                "message": { "conversation": "oi" }
            }
        }));
        assert_eq!(provider().process_evolution_webhook(&inbound).len(), 1);
    }
}
