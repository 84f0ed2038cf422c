//! Meta WhatsApp Cloud API provider

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{debug, error};

use super::{
    digits_only, verify_subscription, AdapterError, AdapterResult, ProviderKind, WhatsAppProvider,
};
use crate::config::MetaConfig;
use crate::model::{SendMessageParams, WhatsAppMessageResponse};

/// Language of every template sent through the Cloud API
pub const TEMPLATE_LANGUAGE: &str = "pt_BR";

pub struct MetaProvider {
    config: MetaConfig,
    http_client: reqwest::Client,
}

impl MetaProvider {
    pub fn new(config: MetaConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// The Cloud API takes bare digits
    pub fn format_phone_number(phone: &str) -> String {
        digits_only(phone)
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/{}/messages",
            self.config.graph_api_url.trim_end_matches('/'),
            self.config.api_version,
            self.config.phone_number_id
        )
    }

    fn to_platform_format(&self, params: &SendMessageParams) -> serde_json::Value {
        let mut payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": Self::format_phone_number(&params.to),
            "type": params.send_type_str(),
        });

        match params.template_name.as_deref() {
            Some(template_name) if params.is_template() => {
                payload["template"] = json!({
                    "name": template_name,
                    "language": { "code": TEMPLATE_LANGUAGE },
                });

                let template_params = params.template_params.as_deref().unwrap_or_default();
                if !template_params.is_empty() {
                    payload["template"]["components"] = json!([{
                        "type": "body",
                        "parameters": template_params
                            .iter()
                            .map(|p| json!({ "type": "text", "text": p }))
                            .collect::<Vec<_>>()
                    }]);
                }
            }
            _ => {
                payload["text"] = json!({ "body": params.message });
            }
        }

        payload
    }
}

#[async_trait]
impl WhatsAppProvider for MetaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Meta
    }

    fn is_configured(&self) -> bool {
        !self.config.phone_number_id.is_empty()
            && !self.config.access_token.expose_secret().is_empty()
    }

    fn sender_address(&self) -> String {
        self.config.phone_number_id.clone()
    }

    async fn send_message(
        &self,
        params: &SendMessageParams,
    ) -> AdapterResult<WhatsAppMessageResponse> {
        if !self.is_configured() {
            return Err(AdapterError::Configuration(
                "WhatsApp credentials not configured: \
                 WHATSAPP_PHONE_NUMBER_ID, WHATSAPP_ACCESS_TOKEN"
                    .to_string(),
            ));
        }
        params.validate()?;

        let payload = self.to_platform_format(params);
        debug!(message_type = params.send_type_str(), "Sending Cloud API message");

        let response = self
            .http_client
            .post(self.messages_url())
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<WhatsAppMessageResponse>()
                .await
                .map_err(|e| AdapterError::Parse(e.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Cloud API rejected message");
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
