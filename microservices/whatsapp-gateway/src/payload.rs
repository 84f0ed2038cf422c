//! Inbound webhook wire shapes
//!
//! Three shapes arrive at the gateway:
//! - Meta Cloud API notifications (`object` + `entry[].changes[].value`), which
//!   every provider accepts for backward compatibility
//! - Evolution API native events (`event` + `instance` + `data`)
//! - Twilio form-encoded message callbacks
//!
//! Every optional collection tolerates both a missing key and an explicit `null`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::providers::{AdapterError, AdapterResult};

/// `object` value carried by every Meta WhatsApp notification
pub const WHATSAPP_BUSINESS_OBJECT: &str = "whatsapp_business_account";

/// Evolution event emitted for new or updated chat messages
pub const EVOLUTION_MESSAGES_UPSERT: &str = "messages.upsert";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Top-level Meta webhook notification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookNotification {
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entry: Vec<WebhookEntry>,
}

impl WebhookNotification {
    /// Parse a raw notification body. A body whose `object` is not a WhatsApp
    /// business account is rejected as malformed.
    pub fn parse(body: &[u8]) -> AdapterResult<Self> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| AdapterError::Parse(e.to_string()))?;

        match value.get("object").and_then(Value::as_str) {
            Some(WHATSAPP_BUSINESS_OBJECT) => {}
            _ => {
                return Err(AdapterError::MalformedWebhook(format!(
                    "expected object \"{}\"",
                    WHATSAPP_BUSINESS_OBJECT
                )))
            }
        }

        serde_json::from_value(value).map_err(|e| AdapterError::Parse(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: WebhookValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookValue {
    #[serde(default, deserialize_with = "null_as_default")]
    pub messaging_product: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: WebhookMetadata,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contacts: Vec<WebhookContact>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<InboundMessage>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub statuses: Vec<WebhookStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_phone_number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookContact {
    #[serde(default)]
    pub profile: Option<WebhookProfile>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub wa_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookProfile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// One inbound message. The content objects (`text`, `image`, ...) stay as raw
/// JSON in `fields` so the shared normalizer can look them up by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub from: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Unix seconds, sent as a string by Meta
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Delivery receipt for a previously sent message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recipient_id: String,
}

/// Evolution API native webhook event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvolutionWebhook {
    #[serde(default, deserialize_with = "null_as_default")]
    pub event: String,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub data: Option<EvolutionData>,
}

impl EvolutionWebhook {
    /// Parse a raw event body. `event` and `data` must both be present and
    /// non-empty, anything else is malformed.
    pub fn parse(body: &[u8]) -> AdapterResult<Self> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| AdapterError::Parse(e.to_string()))?;

        let has_event = value
            .get("event")
            .and_then(Value::as_str)
            .is_some_and(|event| !event.is_empty());
        let has_data = value.get("data").is_some_and(|data| !data.is_null());

        if !has_event || !has_data {
            return Err(AdapterError::MalformedWebhook(
                "missing required fields: event, data".to_string(),
            ));
        }

        serde_json::from_value(value).map_err(|e| AdapterError::Parse(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionData {
    #[serde(default)]
    pub key: Option<EvolutionKey>,
    #[serde(default)]
    pub message: Option<Map<String, Value>>,
    /// Unix seconds, number or numeric string
    #[serde(default)]
    pub message_timestamp: Option<Value>,
    #[serde(default)]
    pub push_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionKey {
    #[serde(default)]
    pub id: Option<String>,
    /// `5511999999999@s.whatsapp.net`
    #[serde(default)]
    pub remote_jid: Option<String>,
    #[serde(default)]
    pub from_me: Option<bool>,
}

/// Twilio inbound message callback (form-encoded)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwilioWebhook {
    #[serde(rename = "MessageSid", default)]
    pub message_sid: String,
    /// `whatsapp:+5511999999999`
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "To", default)]
    pub to: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "NumMedia", default)]
    pub num_media: Option<String>,
    #[serde(rename = "MediaContentType0", default)]
    pub media_content_type: Option<String>,
    #[serde(rename = "ProfileName", default)]
    pub profile_name: Option<String>,
}

impl TwilioWebhook {
    pub fn media_count(&self) -> u32 {
        self.num_media
            .as_deref()
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0)
    }
}
