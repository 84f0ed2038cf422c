//! Application use cases
//!
//! Both use cases borrow the provider and the repository; neither owns state.

use chatdesk_core::{ChatdeskError, Result};
use tracing::{info, warn};

use crate::model::{Message, MessageType, SendMessageParams};
use crate::normalize::extract_statuses;
use crate::payload::WebhookEntry;
use crate::providers::{AdapterError, WhatsAppProvider};
use crate::repository::MessageRepository;

/// Send one message and record it as outgoing
pub struct SendWhatsAppMessage<'a> {
    provider: &'a dyn WhatsAppProvider,
    repository: &'a dyn MessageRepository,
}

impl<'a> SendWhatsAppMessage<'a> {
    pub fn new(
        provider: &'a dyn WhatsAppProvider,
        repository: &'a dyn MessageRepository,
    ) -> Self {
        Self {
            provider,
            repository,
        }
    }

    pub async fn execute(&self, params: SendMessageParams) -> Result<Message> {
        params.validate()?;

        let response = self.provider.send_message(&params).await?;

        let id = response
            .first_message_id()
            .ok_or_else(|| {
                AdapterError::Parse("send response without message id".to_string())
            })?
            .to_string();
        let to = response
            .first_wa_id()
            .filter(|wa_id| !wa_id.is_empty())
            .unwrap_or(params.to.as_str())
            .to_string();

        let message = Message::outgoing(
            id,
            self.provider.sender_address(),
            to,
            params.message,
            MessageType::Text,
        );

        self.repository.save(message.clone()).await?;
        info!(
            provider = %self.provider.kind(),
            message_id = %message.id,
            "Outgoing message recorded"
        );

        Ok(message)
    }
}

/// Normalize one webhook entry, store its messages and apply its receipts
pub struct HandleIncomingWhatsAppMessage<'a> {
    provider: &'a dyn WhatsAppProvider,
    repository: &'a dyn MessageRepository,
}

impl<'a> HandleIncomingWhatsAppMessage<'a> {
    pub fn new(
        provider: &'a dyn WhatsAppProvider,
        repository: &'a dyn MessageRepository,
    ) -> Self {
        Self {
            provider,
            repository,
        }
    }

    pub async fn execute(&self, entry: &WebhookEntry) -> Result<Vec<Message>> {
        let messages = self.provider.process_webhook(entry);
        store_messages(self.repository, &messages).await?;

        for update in extract_statuses(entry) {
            if self.repository.apply_status(&update).await? {
                info!(
                    message_id = %update.id,
                    status = ?update.status,
                    "Message status updated"
                );
            }
        }

        Ok(messages)
    }
}

/// Save messages normalized from a webhook. A message whose id is already
/// stored with the other direction is skipped.
pub async fn store_messages(
    repository: &dyn MessageRepository,
    messages: &[Message],
) -> Result<()> {
    for message in messages {
        match repository.save(message.clone()).await {
            Ok(()) => {}
            Err(ChatdeskError::Conflict(reason)) => {
                warn!(message_id = %message.id, reason = %reason, "Skipping webhook message");
                continue;
            }
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Failed to store webhook message");
                return Err(ChatdeskError::Internal(e.to_string()));
            }
        }
        info!(
            message_id = %message.id,
            from = %message.from,
            message_type = ?message.message_type,
            "Webhook message stored"
        );
    }
    Ok(())
}
