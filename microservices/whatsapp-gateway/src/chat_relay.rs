//! chat-whatsapp relay client
//!
//! The relay drives a QR-paired WhatsApp Web session and exposes it over REST.
//! Older relay builds only serve `/qr-data` and `/health`; lookups fall back to
//! those when the newer `/api/*` endpoints answer 404.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::ChatRelayConfig;
use crate::model::{Message, MessageStatus, MessageType};
use crate::providers::{AdapterError, AdapterResult};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Current pairing QR code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QrCode {
    #[serde(default)]
    pub qr: Option<String>,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub connected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub qr_available: bool,
    #[serde(default)]
    pub info: Option<ClientInfo>,
}

/// Account the relay session is logged into
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default)]
    pub wid: Option<String>,
    #[serde(default)]
    pub pushname: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

/// `/qr-data` of older relays
#[derive(Debug, Default, Deserialize)]
struct LegacyQr {
    #[serde(default)]
    qr: Option<String>,
    #[serde(default)]
    available: bool,
}

impl LegacyQr {
    /// The relay clears its QR code once the session is paired
    fn implies_connected(&self) -> bool {
        self.qr.is_none() && !self.available
    }
}

/// `/health` of older relays
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyHealth {
    #[serde(default)]
    qr_available: bool,
    #[serde(default)]
    connected: Option<bool>,
}

/// A message as the relay reports it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub message_type: String,
    /// `incoming` or `outgoing`
    #[serde(default)]
    pub direction: String,
    /// RFC 3339
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub status: String,
}

impl RelayMessage {
    /// Convert into the gateway's message model
    pub fn to_message(&self) -> Message {
        let message_type = match self.message_type.to_lowercase().as_str() {
            "image" | "sticker" => MessageType::Image,
            "document" => MessageType::Document,
            "audio" | "ptt" => MessageType::Audio,
            "video" => MessageType::Video,
            _ => MessageType::Text,
        };
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let mut message = if self.direction.eq_ignore_ascii_case("outgoing") {
            let mut message = Message::outgoing(
                &self.id,
                &self.from,
                &self.to,
                &self.content,
                message_type,
            );
            message.timestamp = timestamp;
            message
        } else {
            Message::incoming(
                &self.id,
                &self.from,
                &self.to,
                &self.content,
                message_type,
                timestamp,
            )
        };

        if let Some(status) = MessageStatus::from_receipt(&self.status) {
            message.advance_status(status);
        }
        message
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayMessagePage {
    #[serde(default)]
    pub messages: Vec<RelayMessage>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMessages {
    #[serde(default)]
    pub messages: Vec<RelayMessage>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelaySendResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<RelayMessage>,
}

/// REST client for the relay
pub struct ChatRelayClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl ChatRelayClient {
    pub fn new(config: &ChatRelayConfig) -> AdapterResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AdapterError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a JSON document. `Ok(None)` when the relay answers 404.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AdapterResult<Option<T>> {
        let response = self
            .http_client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let text = response
            .text()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(AdapterError::Provider {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| AdapterError::Parse(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AdapterResult<T> {
        self.get_optional(path, &[])
            .await?
            .ok_or_else(|| AdapterError::Provider {
                status: StatusCode::NOT_FOUND.as_u16(),
                body: format!("{} not found", path),
            })
    }

    /// QR code from `/api/qr`, or from `/qr-data` on older relays
    pub async fn qr_code(&self) -> AdapterResult<QrCode> {
        if let Some(qr) = self.get_optional("/api/qr", &[]).await? {
            return Ok(qr);
        }

        debug!(base_url = %self.base_url, "/api/qr not found, falling back to /qr-data");
        let legacy: LegacyQr = self.get_json("/qr-data").await?;
        Ok(QrCode {
            connected: legacy.implies_connected(),
            qr: legacy.qr,
            available: legacy.available,
        })
    }

    /// Connection status from `/api/status`, or combined from `/health` and
    /// `/qr-data` on older relays
    pub async fn status(&self) -> AdapterResult<ConnectionStatus> {
        if let Some(status) = self.get_optional("/api/status", &[]).await? {
            return Ok(status);
        }

        debug!(base_url = %self.base_url, "/api/status not found, using /health and /qr-data");
        let (health, qr): (LegacyHealth, LegacyQr) =
            tokio::try_join!(self.get_json("/health"), self.get_json("/qr-data"))?;

        // Older relays do not report `connected`; infer it from the cleared QR code
        let connected = health.connected.unwrap_or_else(|| qr.implies_connected());
        Ok(ConnectionStatus {
            connected,
            qr_available: health.qr_available || qr.available,
            info: None,
        })
    }

    /// One page of recent messages. Relays without `/api/messages` yield an
    /// empty page.
    pub async fn messages(&self, limit: u32, offset: u32) -> AdapterResult<RelayMessagePage> {
        let query = [("limit", limit.to_string()), ("offset", offset.to_string())];
        match self.get_optional("/api/messages", &query).await? {
            Some(page) => Ok(page),
            None => {
                warn!(base_url = %self.base_url, "Relay has no /api/messages endpoint");
                Ok(RelayMessagePage {
                    messages: Vec::new(),
                    total: 0,
                    limit,
                    offset,
                })
            }
        }
    }

    pub async fn messages_by_user(&self, user_id: &str) -> AdapterResult<UserMessages> {
        self.get_json(&format!("/api/messages/{}", user_id)).await
    }

    pub async fn send(&self, to: &str, message: &str) -> AdapterResult<RelaySendResult> {
        let response = self
            .http_client
            .post(self.url("/api/messages"))
            .json(&json!({ "to": to, "message": message }))
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        if !status.is_success() {
            error!(status = status.as_u16(), "Relay rejected message");
            return Err(AdapterError::Provider {
                status: status.as_u16(),
                body: text,
            });
        }

        let result: RelaySendResult =
            serde_json::from_str(&text).map_err(|e| AdapterError::Parse(e.to_string()))?;
        info!(success = result.success, "Message sent through relay");
        Ok(result)
    }
}

/// Notification pushed by the relay
#[derive(Debug, Clone)]
pub struct ChatRelayWebhook {
    pub event: String,
    pub data: Value,
}

/// Relay webhook events the gateway understands
#[derive(Debug, Clone, PartialEq)]
pub enum ChatRelayEvent {
    Status {
        connected: bool,
        client_info: Option<ClientInfo>,
    },
    Qr {
        available: bool,
    },
    Message(RelayMessage),
    Other(String),
}

impl ChatRelayWebhook {
    /// `event` and `data` must both be present and non-empty
    pub fn parse(body: &[u8]) -> AdapterResult<Self> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| AdapterError::Parse(e.to_string()))?;

        let event = value
            .get("event")
            .and_then(Value::as_str)
            .filter(|event| !event.is_empty())
            .map(str::to_string);
        let data = value.get("data").filter(|data| is_present(data)).cloned();

        match (event, data) {
            (Some(event), Some(data)) => Ok(Self { event, data }),
            _ => Err(AdapterError::MalformedWebhook(
                "missing required fields: event, data".to_string(),
            )),
        }
    }

    pub fn into_event(self) -> AdapterResult<ChatRelayEvent> {
        let field = |name: &str| self.data.get(name).cloned().unwrap_or(Value::Null);

        match self.event.as_str() {
            "status" => Ok(ChatRelayEvent::Status {
                connected: field("connected").as_bool().unwrap_or(false),
                client_info: serde_json::from_value(field("clientInfo")).unwrap_or(None),
            }),
            "qr" => Ok(ChatRelayEvent::Qr {
                available: field("available").as_bool().unwrap_or(false),
            }),
            "message" => {
                let message = self
                    .data
                    .get("message")
                    .filter(|message| message.is_object())
                    .ok_or_else(|| AdapterError::Parse("message event without message".into()))?;
                serde_json::from_value(message.clone())
                    .map(ChatRelayEvent::Message)
                    .map_err(|e| AdapterError::Parse(e.to_string()))
            }
            _ => Ok(ChatRelayEvent::Other(self.event)),
        }
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
