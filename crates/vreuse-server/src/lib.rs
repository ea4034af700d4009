pub mod config;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderValue, Method, header},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use vreuse_api::{AppStateInner, chat_routes};
use vreuse_chat::MessageLog;
use vreuse_db::Database;
use vreuse_gateway::{DeliveryRouter, PresenceRegistry, connection};

#[derive(Clone)]
struct GatewayState {
    router: DeliveryRouter,
    jwt_secret: Arc<str>,
}

/// Wire the store, presence registry and delivery router into the full HTTP
/// app: REST under `/api/chat`, WebSocket at `/gateway`.
pub fn build_app(db: Arc<Database>, jwt_secret: &str, cors_origin: Option<&str>) -> Result<Router> {
    let jwt_secret: Arc<str> = Arc::from(jwt_secret);

    let log = MessageLog::new(db.clone(), db);
    let router = DeliveryRouter::new(log.clone(), PresenceRegistry::new());
    let app_state = Arc::new(AppStateInner::new(log, router.clone(), jwt_secret.clone()));

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(GatewayState { router, jwt_secret });

    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        None => CorsLayer::permissive(),
    };

    Ok(Router::new()
        .nest("/api/chat", chat_routes(app_state))
        .merge(ws_route)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

async fn ws_upgrade(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.router, state.jwt_secret)
    })
}
