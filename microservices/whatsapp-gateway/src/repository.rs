//! Message repository
//!
//! The gateway only needs save/lookup semantics; the in-memory store backs
//! the service until a persistent one is wired in.

use async_trait::async_trait;
use chatdesk_core::{ChatdeskError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::model::{Message, StatusUpdate};

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// All messages, newest first
    async fn get_all(&self) -> Result<Vec<Message>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Message>>;

    /// Messages sent to or received from `contact`, oldest first
    async fn get_by_contact(&self, contact: &str) -> Result<Vec<Message>>;

    /// Insert, or replace the message with the same id. Replacing a message
    /// with one of the other direction fails with `ChatdeskError::Conflict`.
    async fn save(&self, message: Message) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Apply a delivery receipt. Returns whether a stored message changed.
    async fn apply_status(&self, update: &StatusUpdate) -> Result<bool>;
}

/// DashMap-backed store keyed by message id
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: DashMap<String, Message>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn get_all(&self) -> Result<Vec<Message>> {
        let mut all: Vec<Message> = self.messages.iter().map(|m| m.value().clone()).collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Message>> {
        Ok(self.messages.get(id).map(|m| m.value().clone()))
    }

    async fn get_by_contact(&self, contact: &str) -> Result<Vec<Message>> {
        let mut matching: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.value().involves(contact))
            .map(|m| m.value().clone())
            .collect();
        matching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn save(&self, message: Message) -> Result<()> {
        match self.messages.entry(message.id.clone()) {
            Entry::Occupied(mut stored) => {
                if stored.get().direction() != message.direction() {
                    return Err(ChatdeskError::Conflict(format!(
                        "message {} is already stored as {:?}",
                        message.id,
                        stored.get().direction()
                    )));
                }
                stored.insert(message);
            }
            Entry::Vacant(slot) => {
                slot.insert(message);
            }
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.messages.remove(id);
        Ok(())
    }

    async fn apply_status(&self, update: &StatusUpdate) -> Result<bool> {
        match self.messages.get_mut(&update.id) {
            Some(mut message) => {
                let changed = message.advance_status(update.status);
                if !changed {
                    debug!(
                        message_id = %update.id,
                        current = ?message.status(),
                        receipt = ?update.status,
                        "Ignoring out-of-order status receipt"
                    );
                }
                Ok(changed)
            }
            None => {
                debug!(message_id = %update.id, "Status receipt for unknown message");
                Ok(false)
            }
        }
    }
}
