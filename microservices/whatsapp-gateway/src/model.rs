//! Canonical message model shared by every provider

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::{AdapterError, AdapterResult};

/// Kind of content carried by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Document,
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Parse a provider receipt value (`sent`, `delivered`, `read`, `failed`)
    pub fn from_receipt(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Statuses only move forward: sent -> delivered -> read, and a message that
    /// has not been read yet may fail. `Failed` is terminal.
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        match (self, next) {
            (Self::Failed, _) => false,
            (Self::Sent | Self::Delivered, Self::Failed) => true,
            (_, Self::Failed) => false,
            (current, next) => next.rank() > current.rank(),
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Sent => 0,
            Self::Delivered => 1,
            Self::Read => 2,
            Self::Failed => 3,
        }
    }
}

/// A chat message as stored and served by the gateway.
///
/// `direction` is fixed when the message is created and `status` only changes
/// through [`Message::advance_status`], so neither field is public.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    direction: MessageDirection,
    status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

impl Message {
    /// A message received from a contact. Inbound messages start as delivered.
    pub fn incoming(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        content: impl Into<String>,
        message_type: MessageType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            content: content.into(),
            message_type,
            timestamp,
            direction: MessageDirection::Incoming,
            status: MessageStatus::Delivered,
            flow_id: None,
            step_id: None,
        }
    }

    /// A message accepted by a provider for delivery, stamped with the current time.
    pub fn outgoing(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            content: content.into(),
            message_type,
            timestamp: Utc::now(),
            direction: MessageDirection::Outgoing,
            status: MessageStatus::Sent,
            flow_id: None,
            step_id: None,
        }
    }

    pub fn with_flow(mut self, flow_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self.step_id = Some(step_id.into());
        self
    }

    pub fn direction(&self) -> MessageDirection {
        self.direction
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    /// Apply a status receipt. Returns `false` when the transition is not allowed.
    pub fn advance_status(&mut self, next: MessageStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Whether `contact` is either party of this message
    pub fn involves(&self, contact: &str) -> bool {
        self.from == contact || self.to == contact
    }
}

/// How an outbound message is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendType {
    Text,
    Template,
}

/// Canonical outbound send request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageParams {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub send_type: Option<SendType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_params: Option<Vec<String>>,
}

impl SendMessageParams {
    pub fn text(to: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            message: message.into(),
            send_type: Some(SendType::Text),
            ..Default::default()
        }
    }

    pub fn template(
        to: impl Into<String>,
        message: impl Into<String>,
        template_name: impl Into<String>,
        template_params: Vec<String>,
    ) -> Self {
        Self {
            to: to.into(),
            message: message.into(),
            send_type: Some(SendType::Template),
            template_name: Some(template_name.into()),
            template_params: Some(template_params),
        }
    }

    pub fn is_template(&self) -> bool {
        self.send_type == Some(SendType::Template)
    }

    /// Wire value of the `type` field; text when unspecified
    pub fn send_type_str(&self) -> &'static str {
        if self.is_template() {
            "template"
        } else {
            "text"
        }
    }

    pub fn validate(&self) -> AdapterResult<()> {
        if self.to.trim().is_empty() || self.message.trim().is_empty() {
            return Err(AdapterError::Validation(
                "required fields: to, message".to_string(),
            ));
        }

        if self.is_template()
            && self
                .template_name
                .as_deref()
                .map_or(true, |name| name.trim().is_empty())
        {
            return Err(AdapterError::Validation(
                "templateName is required when type is \"template\"".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseContact {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub wa_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub id: String,
}

/// Send result in the Cloud API shape; relay providers answer in this shape too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhatsAppMessageResponse {
    #[serde(default)]
    pub messaging_product: String,
    #[serde(default)]
    pub contacts: Vec<ResponseContact>,
    #[serde(default)]
    pub messages: Vec<ResponseMessage>,
}

impl WhatsAppMessageResponse {
    /// Response synthesized by a relay provider for a single recipient
    pub fn relayed(recipient: impl Into<String>, message_id: impl Into<String>) -> Self {
        let recipient = recipient.into();
        Self {
            messaging_product: "whatsapp".to_string(),
            contacts: vec![ResponseContact {
                input: recipient.clone(),
                wa_id: recipient,
            }],
            messages: vec![ResponseMessage {
                id: message_id.into(),
            }],
        }
    }

    pub fn first_message_id(&self) -> Option<&str> {
        self.messages.first().map(|m| m.id.as_str())
    }

    pub fn first_wa_id(&self) -> Option<&str> {
        self.contacts.first().map(|c| c.wa_id.as_str())
    }
}

/// Delivery receipt extracted from a webhook
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub id: String,
    pub status: MessageStatus,
    pub timestamp: Option<DateTime<Utc>>,
    pub recipient_id: String,
}
