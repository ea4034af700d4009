pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Authenticated chat routes, to be nested under `/api/chat`.
pub fn chat_routes(state: AppState) -> Router {
    Router::new()
        .route("/conversations", get(conversations::list_conversations))
        .route("/start", post(conversations::start_chat))
        .route("/{chat_id}/messages", get(messages::get_messages))
        .route("/{chat_id}/message", post(messages::send_message))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state)
}
