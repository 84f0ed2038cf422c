//! Gateway configuration
//!
//! Read once at startup and handed to the provider selector; nothing reads the
//! environment after that.

use std::time::Duration;

use secrecy::{Secret, SecretString};

use crate::providers::ProviderKind;

pub const DEFAULT_GRAPH_API_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_GRAPH_API_VERSION: &str = "v21.0";
pub const DEFAULT_TWILIO_API_URL: &str = "https://api.twilio.com";
pub const DEFAULT_EVOLUTION_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_EVOLUTION_INSTANCE: &str = "default";
pub const DEFAULT_EVOLUTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CHAT_RELAY_URL: &str = "http://localhost:3000";
pub const DEFAULT_CHAT_RELAY_TIMEOUT: Duration = Duration::from_secs(30);

fn secret(value: Option<String>) -> SecretString {
    Secret::new(value.unwrap_or_default())
}

#[derive(Debug)]
pub struct GatewayConfig {
    pub http_bind: String,
    pub provider: ProviderKind,
    pub meta: MetaConfig,
    pub twilio: TwilioConfig,
    pub evolution: EvolutionConfig,
    pub chat_relay: ChatRelayConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            http_bind: lookup("HTTP_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            provider: ProviderKind::from_config(
                &lookup("WHATSAPP_PROVIDER").unwrap_or_else(|| "meta".to_string()),
            ),
            meta: MetaConfig::from_lookup(&lookup),
            twilio: TwilioConfig::from_lookup(&lookup),
            evolution: EvolutionConfig::from_lookup(&lookup),
            chat_relay: ChatRelayConfig::from_lookup(&lookup),
        }
    }
}

/// Meta Cloud API credentials
#[derive(Debug)]
pub struct MetaConfig {
    pub phone_number_id: String,
    pub access_token: SecretString,
    pub api_version: String,
    pub graph_api_url: String,
    pub verify_token: SecretString,
}

impl MetaConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            phone_number_id: lookup("WHATSAPP_PHONE_NUMBER_ID").unwrap_or_default(),
            access_token: secret(lookup("WHATSAPP_ACCESS_TOKEN")),
            api_version: lookup("WHATSAPP_API_VERSION")
                .unwrap_or_else(|| DEFAULT_GRAPH_API_VERSION.to_string()),
            graph_api_url: lookup("WHATSAPP_GRAPH_API_URL")
                .unwrap_or_else(|| DEFAULT_GRAPH_API_URL.to_string()),
            verify_token: secret(lookup("WHATSAPP_VERIFY_TOKEN")),
        }
    }
}

/// Twilio account credentials
#[derive(Debug)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// Sender number, E.164
    pub whatsapp_number: String,
    pub api_url: String,
    pub verify_token: SecretString,
}

impl TwilioConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            account_sid: lookup("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            auth_token: secret(lookup("TWILIO_AUTH_TOKEN")),
            whatsapp_number: lookup("TWILIO_WHATSAPP_NUMBER").unwrap_or_default(),
            api_url: lookup("TWILIO_API_URL")
                .unwrap_or_else(|| DEFAULT_TWILIO_API_URL.to_string()),
            verify_token: secret(
                lookup("TWILIO_VERIFY_TOKEN").or_else(|| lookup("WHATSAPP_VERIFY_TOKEN")),
            ),
        }
    }
}

/// Evolution API instance settings
#[derive(Debug)]
pub struct EvolutionConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub instance_name: String,
    pub verify_token: SecretString,
    pub timeout: Duration,
}

impl EvolutionConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_url: lookup("EVOLUTION_API_URL")
                .unwrap_or_else(|| DEFAULT_EVOLUTION_API_URL.to_string()),
            api_key: secret(lookup("EVOLUTION_API_KEY")),
            instance_name: lookup("EVOLUTION_INSTANCE_NAME")
                .unwrap_or_else(|| DEFAULT_EVOLUTION_INSTANCE.to_string()),
            verify_token: secret(
                lookup("EVOLUTION_VERIFY_TOKEN").or_else(|| lookup("WHATSAPP_VERIFY_TOKEN")),
            ),
            timeout: DEFAULT_EVOLUTION_TIMEOUT,
        }
    }
}

/// chat-whatsapp relay (QR-paired session server)
#[derive(Debug, Clone)]
pub struct ChatRelayConfig {
    pub api_url: String,
    pub timeout: Duration,
}

impl ChatRelayConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_url: lookup("CHAT_WHATSAPP_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| DEFAULT_CHAT_RELAY_URL.to_string()),
            timeout: DEFAULT_CHAT_RELAY_TIMEOUT,
        }
    }
}
