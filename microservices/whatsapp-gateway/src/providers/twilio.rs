//! Twilio relay provider
//!
//! Sends through the Twilio Messages REST API. Templates are not supported the
//! way the Cloud API does them, so a template request is delivered as its text.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::{debug, error, warn};

use super::{
    verify_subscription, with_country_code, AdapterError, AdapterResult, ProviderKind,
    WhatsAppProvider,
};
use crate::config::TwilioConfig;
use crate::model::{Message, MessageType, SendMessageParams, WhatsAppMessageResponse};
use crate::normalize::media_content;
use crate::payload::TwilioWebhook;

const WHATSAPP_PREFIX: &str = "whatsapp:";

pub struct TwilioProvider {
    config: TwilioConfig,
    /// Only built when account SID and auth token are present
    client: Option<reqwest::Client>,
}

impl TwilioProvider {
    pub fn new(config: TwilioConfig) -> Self {
        let client = if !config.account_sid.is_empty()
            && !config.auth_token.expose_secret().is_empty()
        {
            Some(reqwest::Client::new())
        } else {
            warn!("Twilio credentials missing, client not initialized");
            None
        };

        Self { config, client }
    }

    /// E.164 with the default country code, e.g. `+5511999999999`
    pub fn format_phone_number(phone: &str) -> String {
        format!("+{}", with_country_code(phone))
    }

    fn sender_number(&self) -> &str {
        self.config
            .whatsapp_number
            .strip_prefix(WHATSAPP_PREFIX)
            .unwrap_or(&self.config.whatsapp_number)
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    /// Normalize a native Twilio message callback
    pub fn process_twilio_webhook(&self, payload: &TwilioWebhook) -> Vec<Message> {
        if payload.message_sid.is_empty() {
            debug!("Twilio callback without MessageSid ignored");
            return Vec::new();
        }

        let message_type = if payload.media_count() == 0 {
            MessageType::Text
        } else {
            media_type_from_mime(payload.media_content_type.as_deref().unwrap_or_default())
        };

        let content = match message_type {
            MessageType::Text => payload.body.clone(),
            media => media_content(media, Some(payload.body.as_str()), None),
        };

        vec![Message::incoming(
            payload.message_sid.clone(),
            strip_channel(&payload.from),
            strip_channel(&payload.to),
            content,
            message_type,
            Utc::now(),
        )]
    }
}

fn strip_channel(address: &str) -> String {
    address
        .strip_prefix(WHATSAPP_PREFIX)
        .unwrap_or(address)
        .to_string()
}

fn media_type_from_mime(mime: &str) -> MessageType {
    match mime.split('/').next().unwrap_or_default() {
        "image" => MessageType::Image,
        "audio" => MessageType::Audio,
        "video" => MessageType::Video,
        _ => MessageType::Document,
    }
}

#[async_trait]
impl WhatsAppProvider for TwilioProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Twilio
    }

    fn is_configured(&self) -> bool {
        self.client.is_some() && !self.config.whatsapp_number.is_empty()
    }

    fn sender_address(&self) -> String {
        self.sender_number().to_string()
    }

    async fn send_message(
        &self,
        params: &SendMessageParams,
    ) -> AdapterResult<WhatsAppMessageResponse> {
        if self.config.account_sid.is_empty()
            || self.config.auth_token.expose_secret().is_empty()
            || self.config.whatsapp_number.is_empty()
        {
            return Err(AdapterError::Configuration(
                "Twilio credentials not configured: \
                 TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN, TWILIO_WHATSAPP_NUMBER"
                    .to_string(),
            ));
        }
        let client = self.client.as_ref().ok_or_else(|| {
            AdapterError::Configuration("Twilio client not initialized".to_string())
        })?;
        params.validate()?;

        let to_number = Self::format_phone_number(&params.to);
        let form = [
            ("From", format!("{}{}", WHATSAPP_PREFIX, self.sender_number())),
            ("To", format!("{}{}", WHATSAPP_PREFIX, to_number)),
            ("Body", params.message.clone()),
        ];
        debug!(to = %to_number, "Sending Twilio WhatsApp message");

        let response = client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(self.config.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let result: serde_json::Value = response
                .json()
                .await
                .map_err(|e| AdapterError::Parse(e.to_string()))?;

            let sid = result["sid"]
                .as_str()
                .ok_or_else(|| AdapterError::Parse("Twilio response without sid".to_string()))?;

            Ok(WhatsAppMessageResponse::relayed(to_number, sid))
        } else {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Twilio rejected message");
            Err(AdapterError::Provider {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn verify_webhook(&self, mode: &str, token: &str, challenge: &str) -> Option<String> {
        verify_subscription(&self.config.verify_token, mode, token, challenge)
    }
}
