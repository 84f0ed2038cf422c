//! WhatsApp gateway REST API

mod chat_relay;
mod messages;
mod webhook;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chatdesk_core::{ChatdeskError, ChatdeskService};
use serde_json::json;

use crate::chat_relay::ChatRelayClient;
use crate::repository::MessageRepository;
use crate::selector::Provider;
use crate::service::WhatsAppGatewayService;

#[derive(Clone)]
pub struct AppState {
    pub provider: Provider,
    pub repository: Arc<dyn MessageRepository>,
    pub chat_relay: Arc<ChatRelayClient>,
    /// Answers `/health` and `/ready`
    pub service: Arc<dyn ChatdeskService>,
}

impl AppState {
    pub fn from_service(service: &WhatsAppGatewayService) -> Self {
        Self {
            provider: service.provider().clone(),
            repository: service.repository().clone(),
            chat_relay: service.chat_relay().clone(),
            service: Arc::new(service.clone()),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Webhooks
        .route(
            "/api/webhook/whatsapp",
            get(webhook::verify).post(webhook::receive_whatsapp),
        )
        .route("/api/webhook/evolution", post(webhook::receive_evolution))
        .route("/api/webhook/twilio", post(webhook::receive_twilio))
        .route("/api/webhook/chat-whatsapp", post(chat_relay::receive_webhook))
        // Messages
        .route("/api/messages/send", post(messages::send_message))
        .route("/api/messages", get(messages::list_messages))
        .route("/api/messages/{contact}", get(messages::messages_by_contact))
        // chat-whatsapp relay
        .route("/api/chat-whatsapp/qr", get(chat_relay::qr_code))
        .route("/api/chat-whatsapp/status", get(chat_relay::status))
        .route(
            "/api/chat-whatsapp/messages",
            get(chat_relay::list_messages).post(chat_relay::send_message),
        )
        .route(
            "/api/chat-whatsapp/messages/{user_id}",
            get(chat_relay::messages_by_user),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    Json(state.service.health().await).into_response()
}

async fn ready(State(state): State<AppState>) -> Response {
    let readiness = state.service.ready().await;
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness)).into_response()
}

/// `{ "error": ..., "code": ..., "message": ... }` with an explicit status
pub(crate) fn error_response(status: StatusCode, error: &str, err: &ChatdeskError) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "code": err.error_code(),
            "message": err.to_string(),
        })),
    )
        .into_response()
}

/// Same body, status taken from the error itself
pub(crate) fn error_reply(error: &str, err: &ChatdeskError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, error, err)
}
