use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use tracing::{debug, info};

use vreuse_chat::ChatError;
use vreuse_types::api::{Claims, ConversationsResponse, StartChatRequest, StartChatResponse};

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

/// POST /api/chat/start — find or create the conversation with `partnerId`.
pub async fn start_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<StartChatRequest>, JsonRejection>,
) -> Result<Json<StartChatResponse>, ApiError> {
    // A body that is not `{partnerId: string}` gets the same 400 as a bad id.
    let Json(req) = body.map_err(|rejection| {
        debug!("Rejected start-chat body: {}", rejection.body_text());
        ApiError(ChatError::InvalidPartner)
    })?;
    let requester = claims.sub;
    let resolver = state.resolver.clone();

    let resolved = run_blocking(move || resolver.resolve(requester, &req.partner_id)).await?;

    info!(
        "{} opened conversation {} with {} ({} messages)",
        requester,
        resolved.conversation.id,
        resolved.partner.id,
        resolved.messages.len()
    );

    Ok(Json(StartChatResponse {
        chat_id: resolved.conversation.id,
        messages: resolved.messages,
        partner: resolved.partner,
    }))
}

/// GET /api/chat/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let log = state.log.clone();
    let conversations = run_blocking(move || log.list_conversations_for(claims.sub)).await?;

    Ok(Json(ConversationsResponse { conversations }))
}
