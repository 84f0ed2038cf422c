//! chat-whatsapp relay endpoints
//!
//! Lookups are passed through to the relay; any relay failure is a 500.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chatdesk_core::ChatdeskError;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::webhook::{acknowledge_failure, rejected_payload};
use super::{error_reply, error_response, AppState};
use crate::chat_relay::{ChatRelayEvent, ChatRelayWebhook, DEFAULT_PAGE_LIMIT};
use crate::providers::AdapterError;
use crate::usecases::store_messages;

fn relay_failure(context: &str, err: AdapterError) -> Response {
    error!(error = %err, "chat-whatsapp relay call failed: {}", context);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        context,
        &ChatdeskError::from(err),
    )
}

/// GET /api/chat-whatsapp/qr
pub(super) async fn qr_code(State(state): State<AppState>) -> Response {
    match state.chat_relay.qr_code().await {
        Ok(qr) => Json(qr).into_response(),
        Err(e) => relay_failure("failed to fetch QR code", e),
    }
}

/// GET /api/chat-whatsapp/status
pub(super) async fn status(State(state): State<AppState>) -> Response {
    match state.chat_relay.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => relay_failure("failed to fetch status", e),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct PageQuery {
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

/// GET /api/chat-whatsapp/messages?limit=50&offset=0
pub(super) async fn list_messages(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Response {
    let limit = page.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let offset = page.offset.unwrap_or(0);

    match state.chat_relay.messages(limit, offset).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => relay_failure("failed to fetch messages", e),
    }
}

/// GET /api/chat-whatsapp/messages/{user_id}
pub(super) async fn messages_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.chat_relay.messages_by_user(&user_id).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => relay_failure("failed to fetch user messages", e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RelaySendRequest {
    #[serde(default)]
    to: String,
    #[serde(default)]
    message: String,
}

/// POST /api/chat-whatsapp/messages
pub(super) async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<RelaySendRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let err = ChatdeskError::Validation(rejection.body_text());
            return error_reply("invalid request", &err);
        }
    };

    if request.to.trim().is_empty() || request.message.trim().is_empty() {
        let err = ChatdeskError::Validation("required fields: to, message".to_string());
        return error_reply("invalid request", &err);
    }

    match state.chat_relay.send(&request.to, &request.message).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => relay_failure("failed to send message", e),
    }
}

/// POST /api/webhook/chat-whatsapp - relay notifications
pub(super) async fn receive_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let payload = match ChatRelayWebhook::parse(&body) {
        Ok(payload) => payload,
        Err(e) => return rejected_payload("chat-whatsapp", e),
    };

    let event = match payload.into_event() {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Failed to read chat-whatsapp event");
            return acknowledge_failure(&ChatdeskError::from(e));
        }
    };

    match event {
        ChatRelayEvent::Status {
            connected,
            client_info,
        } => {
            info!(connected, client_info = ?client_info, "chat-whatsapp status changed");
        }
        ChatRelayEvent::Qr { available } => {
            info!(available, "chat-whatsapp QR code updated");
        }
        ChatRelayEvent::Message(relayed) => {
            let message = relayed.to_message();
            info!(
                message_id = %message.id,
                direction = ?message.direction(),
                "chat-whatsapp message received"
            );
            if let Err(e) = store_messages(state.repository.as_ref(), &[message]).await {
                error!(error = %e, "Failed to store chat-whatsapp message");
                return acknowledge_failure(&e);
            }
        }
        ChatRelayEvent::Other(event) => {
            warn!(event = %event, "Unknown chat-whatsapp event");
        }
    }

    Json(json!({ "status": "ok", "received": true })).into_response()
}
