//! WhatsApp provider trait and implementations

pub mod evolution;
pub mod meta;
pub mod twilio;

use std::fmt;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::model::{Message, SendMessageParams, WhatsAppMessageResponse};
use crate::normalize::{self, META_FIELDS};
use crate::payload::WebhookEntry;

/// Result of provider operations
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Provider errors
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error: {status} - {body}")]
    Provider { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Malformed webhook: {0}")]
    MalformedWebhook(String),
}

impl From<AdapterError> for chatdesk_core::ChatdeskError {
    fn from(err: AdapterError) -> Self {
        use chatdesk_core::ChatdeskError;

        match err {
            AdapterError::Configuration(msg) => ChatdeskError::Config(msg),
            AdapterError::Network(msg) => ChatdeskError::Network(msg),
            AdapterError::Validation(msg) => ChatdeskError::Validation(msg),
            AdapterError::MalformedWebhook(msg) => ChatdeskError::MalformedPayload(msg),
            err @ (AdapterError::Provider { .. } | AdapterError::Parse(_)) => {
                ChatdeskError::Provider(err.to_string())
            }
        }
    }
}

/// Backend used to reach WhatsApp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Meta Cloud API, called directly
    Meta,
    Twilio,
    Evolution,
}

impl ProviderKind {
    /// Case-insensitive; anything unrecognized selects the Cloud API.
    pub fn from_config(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "twilio" => Self::Twilio,
            "evolution" => Self::Evolution,
            _ => Self::Meta,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Twilio => "twilio",
            Self::Evolution => "evolution",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait that all WhatsApp providers implement
#[async_trait]
pub trait WhatsAppProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether the credentials needed to send are present
    fn is_configured(&self) -> bool;

    /// Address recorded as the sender of outgoing messages
    fn sender_address(&self) -> String;

    /// Send one message. Missing credentials fail before any request is made.
    async fn send_message(
        &self,
        params: &SendMessageParams,
    ) -> AdapterResult<WhatsAppMessageResponse>;

    /// Webhook subscription handshake: echo `challenge` when the token matches.
    fn verify_webhook(&self, mode: &str, token: &str, challenge: &str) -> Option<String>;

    /// Normalize one Cloud API shaped webhook entry into inbound messages
    fn process_webhook(&self, entry: &WebhookEntry) -> Vec<Message> {
        let messages = normalize::normalize_entry(entry, &META_FIELDS);
        tracing::debug!(provider = %self.kind(), count = messages.len(), "Processed webhook entry");
        messages
    }
}

/// Shared subscription check. An unset verify token never matches.
pub(crate) fn verify_subscription(
    expected: &SecretString,
    mode: &str,
    token: &str,
    challenge: &str,
) -> Option<String> {
    let expected = expected.expose_secret();
    if mode == "subscribe" && !expected.is_empty() && token == expected.as_str() {
        Some(challenge.to_string())
    } else {
        None
    }
}

/// Keep only ASCII digits
pub(crate) fn digits_only(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Default country code prepended by the relay providers
pub(crate) const DEFAULT_COUNTRY_CODE: &str = "55";

/// Digits with the default country code prepended when absent
pub(crate) fn with_country_code(phone: &str) -> String {
    let digits = digits_only(phone);
    if digits.starts_with(DEFAULT_COUNTRY_CODE) {
        digits
    } else {
        format!("{}{}", DEFAULT_COUNTRY_CODE, digits)
    }
}

/// Re-export providers
pub use evolution::EvolutionProvider;
pub use meta::MetaProvider;
pub use twilio::TwilioProvider;
