use std::sync::Arc;

use tracing::error;

use vreuse_chat::{ChatError, ConversationResolver, MessageLog};
use vreuse_gateway::DeliveryRouter;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub log: MessageLog,
    pub resolver: ConversationResolver,
    pub router: DeliveryRouter,
    pub jwt_secret: Arc<str>,
}

impl AppStateInner {
    pub fn new(log: MessageLog, router: DeliveryRouter, jwt_secret: Arc<str>) -> Self {
        Self {
            resolver: ConversationResolver::new(log.clone()),
            log,
            router,
            jwt_secret,
        }
    }
}

/// Run blocking store work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ChatError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::from(ChatError::Transient(e.into()))
        })?
        .map_err(ApiError::from)
}
