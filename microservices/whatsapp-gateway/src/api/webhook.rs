//! Webhook endpoints
//!
//! Providers retry on anything but 2xx, so once a payload has been accepted as
//! well formed, processing failures are reported with a 200.

use axum::{
    body::Bytes,
    extract::{rejection::FormRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use chatdesk_core::ChatdeskError;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::{error_reply, error_response, AppState};
use crate::payload::{EvolutionWebhook, TwilioWebhook, WebhookNotification};
use crate::providers::AdapterError;
use crate::selector::Provider;
use crate::usecases::{store_messages, HandleIncomingWhatsAppMessage};

const EMPTY_TWIML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>";

#[derive(Debug, Default, Deserialize)]
pub(super) struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Processing failed after the payload was accepted: acknowledge with a 200
pub(super) fn acknowledge_failure(err: &ChatdeskError) -> Response {
    error_response(StatusCode::OK, "internal error", err)
}

/// 400 for malformed payloads, 200 for anything that failed later
pub(super) fn rejected_payload(source: &str, err: AdapterError) -> Response {
    match err {
        AdapterError::MalformedWebhook(msg) => {
            warn!(source, reason = %msg, "Malformed webhook");
            error_reply("invalid webhook", &ChatdeskError::MalformedPayload(msg))
        }
        other => {
            error!(source, error = %other, "Failed to parse webhook");
            acknowledge_failure(&ChatdeskError::from(other))
        }
    }
}

fn wrong_provider(state: &AppState, expected: &str) -> Response {
    warn!(
        provider = %state.provider.kind(),
        expected,
        "Webhook received for an inactive provider"
    );
    let err = ChatdeskError::Validation(format!("active provider is {}", state.provider.kind()));
    error_reply("wrong provider", &err)
}

/// GET /api/webhook/whatsapp - subscription handshake
pub(super) async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let (Some(mode), Some(token), Some(challenge)) = (
        present(query.mode),
        present(query.verify_token),
        present(query.challenge),
    ) else {
        let err = ChatdeskError::Validation(
            "hub.mode, hub.verify_token and hub.challenge are required".to_string(),
        );
        return error_reply("missing parameters", &err);
    };

    match state.provider.as_dyn().verify_webhook(&mode, &token, &challenge) {
        Some(challenge) => {
            info!("Webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!(mode = %mode, "Webhook verification rejected");
            let err = ChatdeskError::Forbidden("verification failed".to_string());
            error_reply("forbidden", &err)
        }
    }
}

/// POST /api/webhook/whatsapp - Cloud API shaped notifications, any provider
pub(super) async fn receive_whatsapp(State(state): State<AppState>, body: Bytes) -> Response {
    let notification = match WebhookNotification::parse(&body) {
        Ok(notification) => notification,
        Err(e) => return rejected_payload("whatsapp", e),
    };

    let handler =
        HandleIncomingWhatsAppMessage::new(state.provider.as_dyn(), state.repository.as_ref());
    let mut received = 0;
    for entry in &notification.entry {
        match handler.execute(entry).await {
            Ok(messages) => received += messages.len(),
            Err(e) => {
                error!(entry_id = %entry.id, error = %e, "Failed to handle webhook entry");
                return acknowledge_failure(&e);
            }
        }
    }

    info!(provider = %state.provider.kind(), received, "WhatsApp webhook processed");
    Json(json!({ "status": "ok" })).into_response()
}

/// POST /api/webhook/evolution - native Evolution API events
pub(super) async fn receive_evolution(State(state): State<AppState>, body: Bytes) -> Response {
    let payload = match EvolutionWebhook::parse(&body) {
        Ok(payload) => payload,
        Err(e) => return rejected_payload("evolution", e),
    };

    let Provider::Evolution(provider) = &state.provider else {
        return wrong_provider(&state, "evolution");
    };

    let messages = provider.process_evolution_webhook(&payload);
    if let Err(e) = store_messages(state.repository.as_ref(), &messages).await {
        error!(error = %e, "Failed to store Evolution messages");
        return acknowledge_failure(&e);
    }

    info!(event = %payload.event, received = messages.len(), "Evolution webhook processed");
    Json(json!({ "status": "ok" })).into_response()
}

/// POST /api/webhook/twilio - native Twilio message callbacks
pub(super) async fn receive_twilio(
    State(state): State<AppState>,
    form: Result<Form<TwilioWebhook>, FormRejection>,
) -> Response {
    let Form(payload) = match form {
        Ok(form) => form,
        Err(rejection) => {
            warn!(error = %rejection, "Malformed Twilio webhook");
            let err = ChatdeskError::MalformedPayload(rejection.body_text());
            return error_reply("invalid webhook", &err);
        }
    };

    let Provider::Twilio(provider) = &state.provider else {
        return wrong_provider(&state, "twilio");
    };

    let messages = provider.process_twilio_webhook(&payload);
    if let Err(e) = store_messages(state.repository.as_ref(), &messages).await {
        error!(error = %e, "Failed to store Twilio messages");
    }

    info!(received = messages.len(), "Twilio webhook processed");
    ([(header::CONTENT_TYPE, "text/xml")], EMPTY_TWIML).into_response()
}
