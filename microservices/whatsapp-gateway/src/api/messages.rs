//! Message endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chatdesk_core::ChatdeskError;
use tracing::error;

use super::{error_reply, error_response, AppState};
use crate::model::SendMessageParams;
use crate::usecases::SendWhatsAppMessage;

/// POST /api/messages/send
pub(super) async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendMessageParams>, JsonRejection>,
) -> Response {
    let Json(params) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let err = ChatdeskError::Validation(rejection.body_text());
            return error_reply("invalid request", &err);
        }
    };

    if let Err(e) = params.validate() {
        return error_reply("invalid request", &ChatdeskError::from(e));
    }

    let use_case = SendWhatsAppMessage::new(state.provider.as_dyn(), state.repository.as_ref());
    match use_case.execute(params).await {
        Ok(message) => Json(message).into_response(),
        Err(e) => {
            error!(provider = %state.provider.kind(), error = %e, "Failed to send message");
            error_reply("failed to send message", &e)
        }
    }
}

/// GET /api/messages
pub(super) async fn list_messages(State(state): State<AppState>) -> Response {
    match state.repository.get_all().await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error", &e),
    }
}

/// GET /api/messages/{contact}
pub(super) async fn messages_by_contact(
    State(state): State<AppState>,
    Path(contact): Path<String>,
) -> Response {
    match state.repository.get_by_contact(&contact).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error", &e),
    }
}
