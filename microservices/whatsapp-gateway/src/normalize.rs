//! Webhook normalization shared by all providers
//!
//! Every provider resolves the message type the same way: check the content
//! fields in the fixed order text, image, audio, video, document and take the
//! first one present. Providers differ only in field names, captured by a
//! [`FieldMapping`].

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::model::{Message, MessageStatus, MessageType, StatusUpdate};
use crate::payload::WebhookEntry;

pub const IMAGE_PLACEHOLDER: &str = "Imagem recebida";
pub const AUDIO_PLACEHOLDER: &str = "Áudio recebido";
pub const VIDEO_PLACEHOLDER: &str = "Vídeo recebido";
pub const DOCUMENT_PLACEHOLDER: &str = "Documento recebido";

/// Where the text body of a message lives
#[derive(Debug, Clone, Copy)]
pub enum TextField {
    /// The field itself is the body string (`conversation`)
    Plain(&'static str),
    /// The body is a key inside the field's object (`text.body`)
    Nested(&'static str, &'static str),
}

impl TextField {
    fn name(&self) -> &'static str {
        match self {
            Self::Plain(name) | Self::Nested(name, _) => name,
        }
    }
}

/// Per-provider names of the content fields
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub text: &'static [TextField],
    pub image: &'static str,
    pub audio: &'static str,
    pub video: &'static str,
    pub document: &'static str,
    pub caption: &'static str,
    pub document_filename: &'static str,
}

/// Cloud API message objects
pub const META_FIELDS: FieldMapping = FieldMapping {
    text: &[TextField::Nested("text", "body")],
    image: "image",
    audio: "audio",
    video: "video",
    document: "document",
    caption: "caption",
    document_filename: "filename",
};

/// Evolution API (Baileys) message objects
pub const EVOLUTION_FIELDS: FieldMapping = FieldMapping {
    text: &[
        TextField::Plain("conversation"),
        TextField::Nested("extendedTextMessage", "text"),
    ],
    image: "imageMessage",
    audio: "audioMessage",
    video: "videoMessage",
    document: "documentMessage",
    caption: "caption",
    document_filename: "fileName",
};

/// Type and display content resolved from a message object
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub message_type: MessageType,
    pub content: String,
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(_) => true,
    }
}

fn non_empty_str<'a>(object: Option<&'a Value>, key: &str) -> Option<&'a str> {
    object
        .and_then(|o| o.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Content shown for a media message: the caption, then (documents only) the
/// file name, then a fixed placeholder. Audio never carries a caption.
pub fn media_content(
    message_type: MessageType,
    caption: Option<&str>,
    filename: Option<&str>,
) -> String {
    let caption = caption.filter(|c| !c.is_empty());
    let filename = filename.filter(|f| !f.is_empty());

    match message_type {
        MessageType::Text => caption.unwrap_or_default().to_string(),
        MessageType::Image => caption.unwrap_or(IMAGE_PLACEHOLDER).to_string(),
        MessageType::Audio => AUDIO_PLACEHOLDER.to_string(),
        MessageType::Video => caption.unwrap_or(VIDEO_PLACEHOLDER).to_string(),
        MessageType::Document => caption
            .or(filename)
            .unwrap_or(DOCUMENT_PLACEHOLDER)
            .to_string(),
    }
}

/// Resolve type and content of one message object. An object with none of the
/// known fields is treated as empty text.
pub fn classify(fields: &Map<String, Value>, mapping: &FieldMapping) -> Classified {
    if let Some(text_field) = mapping
        .text
        .iter()
        .find(|field| is_present(fields.get(field.name())))
    {
        let content = match text_field {
            TextField::Plain(name) => fields.get(*name).and_then(Value::as_str),
            TextField::Nested(name, key) => fields
                .get(*name)
                .and_then(|o| o.get(*key))
                .and_then(Value::as_str),
        };
        return Classified {
            message_type: MessageType::Text,
            content: content.unwrap_or_default().to_string(),
        };
    }

    let media = [
        (mapping.image, MessageType::Image),
        (mapping.audio, MessageType::Audio),
        (mapping.video, MessageType::Video),
        (mapping.document, MessageType::Document),
    ];

    for (field, message_type) in media {
        let object = fields.get(field);
        if is_present(object) {
            let filename = if message_type == MessageType::Document {
                non_empty_str(object, mapping.document_filename)
            } else {
                None
            };
            return Classified {
                message_type,
                content: media_content(
                    message_type,
                    non_empty_str(object, mapping.caption),
                    filename,
                ),
            };
        }
    }

    Classified {
        message_type: MessageType::Text,
        content: String::new(),
    }
}

/// Parse Unix seconds sent either as a JSON number or a numeric string
pub fn parse_unix_seconds(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let seconds = match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(seconds, 0)
}

/// Extract inbound messages from a Cloud API shaped entry, in arrival order.
/// Status receipts in the same entry are logged, not returned.
pub fn normalize_entry(entry: &WebhookEntry, mapping: &FieldMapping) -> Vec<Message> {
    let mut messages = Vec::new();

    for change in &entry.changes {
        let value = &change.value;

        for msg in &value.messages {
            let classified = classify(&msg.fields, mapping);
            let timestamp = parse_unix_seconds(msg.timestamp.as_ref()).unwrap_or_else(|| {
                debug!(
                    message_id = %msg.id,
                    "Webhook message without valid timestamp, using receive time"
                );
                Utc::now()
            });

            messages.push(Message::incoming(
                msg.id.clone(),
                msg.from.clone(),
                value.metadata.phone_number_id.clone(),
                classified.content,
                classified.message_type,
                timestamp,
            ));
        }

        for status in &value.statuses {
            info!(message_id = %status.id, status = %status.status, "Status receipt received");
        }
    }

    messages
}

/// Delivery receipts carried by an entry. Unknown status values are skipped.
pub fn extract_statuses(entry: &WebhookEntry) -> Vec<StatusUpdate> {
    entry
        .changes
        .iter()
        .flat_map(|change| change.value.statuses.iter())
        .filter_map(|status| match MessageStatus::from_receipt(&status.status) {
            Some(parsed) => Some(StatusUpdate {
                id: status.id.clone(),
                status: parsed,
                timestamp: parse_unix_seconds(status.timestamp.as_ref()),
                recipient_id: status.recipient_id.clone(),
            }),
            None => {
                warn!(message_id = %status.id, status = %status.status, "Unknown status receipt");
                None
            }
        })
        .collect()
}
