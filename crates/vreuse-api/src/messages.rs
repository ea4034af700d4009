use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use vreuse_chat::ChatError;
use vreuse_types::api::{Claims, MessagesResponse, SendMessageRequest, SendMessageResponse};

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

/// Malformed and unknown chat ids both answer 403, the same as a chat the
/// requester is not part of.
fn parse_chat_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError(ChatError::NotAuthorized))
}

/// GET /api/chat/{chat_id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let chat_id = parse_chat_id(&chat_id)?;
    let log = state.log.clone();

    let messages = run_blocking(move || log.list_messages(chat_id, claims.sub)).await?;

    Ok(Json(MessagesResponse { messages }))
}

/// POST /api/chat/{chat_id}/message — store, then push to present
/// participants exactly as a live `Send` would.
pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = parse_chat_id(&chat_id)?;
    let Json(req) = body.map_err(|rejection| {
        debug!("Rejected send body: {}", rejection.body_text());
        ApiError(ChatError::EmptyOrOversizeText)
    })?;
    let log = state.log.clone();
    let sender = claims.sub;

    let message = run_blocking(move || {
        let message = log
            .append_message(chat_id, sender, &req.text)
            .map_err(|e| match e {
                ChatError::ConversationNotFound | ChatError::NotParticipant => {
                    ChatError::NotAuthorized
                }
                other => other,
            })?;
        log.attach_sender(message)
    })
    .await?;

    state.router.fan_out(&message).await;

    Ok((StatusCode::CREATED, Json(SendMessageResponse { message })))
}
