use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;
use uuid::Uuid;

use vreuse_api::{AppStateInner, chat_routes};
use vreuse_chat::MessageLog;
use vreuse_db::Database;
use vreuse_gateway::{ConnectionHandle, DeliveryRouter, PresenceRegistry};
use vreuse_types::api::Claims;
use vreuse_types::events::GatewayEvent;

const SECRET: &str = "test-secret";

struct TestApp {
    app: Router,
    db: Arc<Database>,
    presence: PresenceRegistry,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let log = MessageLog::new(db.clone(), db.clone());
        let presence = PresenceRegistry::new();
        let router = DeliveryRouter::new(log.clone(), presence.clone());
        let state = Arc::new(AppStateInner::new(log, router, Arc::from(SECRET)));

        Self {
            app: Router::new().nest("/api/chat", chat_routes(state)),
            db,
            presence,
        }
    }

    fn user(&self, email: &str, name: &str) -> (Uuid, String) {
        let id = Uuid::new_v4();
        self.db.create_user(id, email, name).unwrap();
        (id, token_for(id, email, chrono::Duration::hours(1)))
    }

    async fn connect(&self, user_id: Uuid) -> UnboundedReceiver<GatewayEvent> {
        let (handle, rx) = ConnectionHandle::new();
        self.presence.register(user_id, handle).await;
        rx
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

fn token_for(user_id: Uuid, email: &str, valid_for: chrono::Duration) -> String {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + valid_for).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn delivered_texts(rx: &mut UnboundedReceiver<GatewayEvent>) -> Vec<String> {
    let mut texts = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let GatewayEvent::Deliver { message } = event {
            texts.push(message.text);
        }
    }
    texts
}

#[tokio::test]
async fn requests_without_valid_token_are_rejected() {
    let app = TestApp::new();
    let (alice, _) = app.user("alice@vit.ac.in", "Alice");

    let (status, _) = app.call("GET", "/api/chat/conversations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call("GET", "/api/chat/conversations", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let expired = token_for(alice, "alice@vit.ac.in", chrono::Duration::hours(-2));
    let (status, _) = app
        .call("GET", "/api/chat/conversations", Some(expired.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn start_chat_validation() {
    let app = TestApp::new();
    let (alice, alice_token) = app.user("alice@vit.ac.in", "Alice");
    let token = Some(alice_token.as_str());

    let (status, body) = app
        .call("POST", "/api/chat/start", token, Some(json!({ "partnerId": "nope" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid partner ID");

    let (status, _) = app.call("POST", "/api/chat/start", token, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call("POST", "/api/chat/start", token, Some(json!({ "partnerId": alice })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot chat with yourself");

    let (status, body) = app
        .call("POST", "/api/chat/start", token, Some(json!({ "partnerId": Uuid::new_v4() })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Partner user not found");
}

#[tokio::test]
async fn start_chat_is_idempotent_from_both_sides() {
    let app = TestApp::new();
    let (alice, alice_token) = app.user("alice@vit.ac.in", "Alice");
    let (bob, bob_token) = app.user("bob@vit.ac.in", "Bob");

    let (status, first) = app
        .call("POST", "/api/chat/start", Some(alice_token.as_str()), Some(json!({ "partnerId": bob })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["messages"], json!([]));
    assert_eq!(first["partner"]["email"], "bob@vit.ac.in");
    assert!(first["partner"].get("password").is_none());

    let (status, second) = app
        .call("POST", "/api/chat/start", Some(bob_token.as_str()), Some(json!({ "partnerId": alice })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["chatId"], second["chatId"]);
    assert_eq!(second["partner"]["name"], "Alice");
}

#[tokio::test]
async fn send_over_http_reaches_present_partner() {
    let app = TestApp::new();
    let (u1, u1_token) = app.user("u1@vit.ac.in", "User One");
    let (u2, u2_token) = app.user("u2@vit.ac.in", "User Two");

    let (_, started) = app
        .call("POST", "/api/chat/start", Some(u1_token.as_str()), Some(json!({ "partnerId": u2 })))
        .await;
    let chat_id = started["chatId"].as_str().unwrap().to_string();
    assert_eq!(started["messages"], json!([]));

    let mut u1_rx = app.connect(u1).await;

    let (status, sent) = app
        .call(
            "POST",
            &format!("/api/chat/{}/message", chat_id),
            Some(u2_token.as_str()),
            Some(json!({ "text": "hi" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["message"]["text"], "hi");
    assert_eq!(sent["message"]["conversationId"], chat_id.as_str());
    assert_eq!(sent["message"]["sender"]["id"], u2.to_string());
    assert_eq!(sent["message"]["read"], false);

    assert_eq!(delivered_texts(&mut u1_rx), vec!["hi".to_string()]);

    let (status, listed) = app
        .call("GET", "/api/chat/conversations", Some(u2_token.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let conversations = listed["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["conversationId"], chat_id.as_str());
    assert_eq!(conversations[0]["lastMessage"], "hi");
    assert_eq!(conversations[0]["partner"]["id"], u1.to_string());

    let (status, history) = app
        .call("GET", &format!("/api/chat/{}/messages", chat_id), Some(u1_token.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["messages"][0]["text"], "hi");
}

#[tokio::test]
async fn outsiders_get_forbidden() {
    let app = TestApp::new();
    let (_, u1_token) = app.user("u1@vit.ac.in", "User One");
    let (u2, _) = app.user("u2@vit.ac.in", "User Two");
    let (_, outsider_token) = app.user("eve@vit.ac.in", "Eve");

    let (_, started) = app
        .call("POST", "/api/chat/start", Some(u1_token.as_str()), Some(json!({ "partnerId": u2 })))
        .await;
    let chat_id = started["chatId"].as_str().unwrap().to_string();

    let (status, _) = app
        .call("GET", &format!("/api/chat/{}/messages", chat_id), Some(outsider_token.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            "POST",
            &format!("/api/chat/{}/message", chat_id),
            Some(outsider_token.as_str()),
            Some(json!({ "text": "let me in" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Unknown and malformed ids look the same as someone else's chat.
    for id in [Uuid::new_v4().to_string(), "not-a-chat".to_string()] {
        let (status, _) = app
            .call("GET", &format!("/api/chat/{}/messages", id), Some(u1_token.as_str()), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call(
                "POST",
                &format!("/api/chat/{}/message", id),
                Some(u1_token.as_str()),
                Some(json!({ "text": "hello?" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let (status, listed) = app
        .call("GET", "/api/chat/conversations", Some(outsider_token.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["conversations"], json!([]));
}

#[tokio::test]
async fn send_rejects_bad_text() {
    let app = TestApp::new();
    let (_, u1_token) = app.user("u1@vit.ac.in", "User One");
    let (u2, _) = app.user("u2@vit.ac.in", "User Two");

    let (_, started) = app
        .call("POST", "/api/chat/start", Some(u1_token.as_str()), Some(json!({ "partnerId": u2 })))
        .await;
    let uri = format!("/api/chat/{}/message", started["chatId"].as_str().unwrap());

    let (status, _) = app.call("POST", &uri, Some(u1_token.as_str()), Some(json!({ "text": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let long = "x".repeat(1001);
    let (status, body) = app
        .call("POST", &uri, Some(u1_token.as_str()), Some(json!({ "text": long })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("1000"));
}

#[tokio::test]
async fn malformed_bodies_answer_400_with_json_error() {
    let app = TestApp::new();
    let (_, alice_token) = app.user("alice@vit.ac.in", "Alice");
    let (bob, _) = app.user("bob@vit.ac.in", "Bob");
    let token = Some(alice_token.as_str());

    let (status, body) = app
        .call("POST", "/api/chat/start", token, Some(json!({ "partnerId": 123 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid partner ID");

    // Extra client fields are ignored.
    let (status, started) = app
        .call("POST", "/api/chat/start", token, Some(json!({ "partnerId": bob, "itemId": "x" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let uri = format!("/api/chat/{}/message", started["chatId"].as_str().unwrap());

    let (status, body) = app.call("POST", &uri, token, Some(json!({ "text": 42 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("1000"));

    let (status, sent) = app
        .call("POST", &uri, token, Some(json!({ "text": "still here", "clientId": "tmp-1" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["message"]["text"], "still here");
}
