use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use duet_api::{AppStateInner, routes};
use duet_db::Database;
use duet_db::pagination::PageLimits;
use duet_gateway::ChatHub;
use duet_gateway::dispatcher::Dispatcher;
use duet_types::api::Claims;

const SECRET: &str = "integration-test-secret";

fn app() -> Router {
    let store = Arc::new(Database::open_in_memory().unwrap());
    let hub = ChatHub::new(store, Arc::new(Dispatcher::new()), PageLimits::default());
    routes(AppStateInner::new(hub, SECRET))
}

fn token(user: &str) -> String {
    let claims = Claims {
        sub: user.into(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn call(app: &Router, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn open_room(app: &Router, a: &str, b: &str) -> String {
    let (status, body) = call(app, "POST", "/rooms", Some(a), Some(json!({ "participant_id": b }))).await;
    assert!(status.is_success());
    body["room_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn requires_bearer_token() {
    let app = app();
    let (status, _) = call(&app, "GET", "/unread", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/unread")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_room_is_idempotent() {
    let app = app();
    let (status, first) = call(&app, "POST", "/rooms", Some("alice"), Some(json!({ "participant_id": "bob" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["created"], true);

    let (status, second) = call(&app, "POST", "/rooms", Some("bob"), Some(json!({ "participant_id": "alice" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["room_id"], first["room_id"]);

    let (status, _) = call(&app, "POST", "/rooms", Some("alice"), Some(json!({ "participant_id": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_then_page_history() {
    let app = app();
    let room = open_room(&app, "alice", "bob").await;

    for i in 0..5 {
        let (status, body) = call(
            &app,
            "POST",
            &format!("/rooms/{room}/messages"),
            Some("alice"),
            Some(json!({ "content": format!("message {i}") })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["outcome"], "QUEUED_OFFLINE");
    }

    let uri = format!("/rooms/{room}/messages?size=3&include_system_events=false");
    let (status, page) = call(&app, "GET", &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"].as_array().unwrap().len(), 3);
    assert_eq!(page["has_next"], true);
    assert_eq!(page["items"][0]["content"], "message 4");

    let cursor = page["next_cursor"].as_str().unwrap();
    let uri = format!("/rooms/{room}/messages?size=3&include_system_events=false&cursor={cursor}");
    let (_, next) = call(&app, "GET", &uri, Some("bob"), None).await;
    let contents: Vec<&str> = next["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["message 1", "message 0"]);
    assert_eq!(next["has_next"], false);
}

#[tokio::test]
async fn history_filters_by_category() {
    let app = app();
    let room = open_room(&app, "alice", "bob").await;
    call(&app, "POST", &format!("/rooms/{room}/messages"), Some("bob"), Some(json!({ "content": "hi" }))).await;

    let uri = format!("/rooms/{room}/messages?categories=notice");
    let (_, page) = call(&app, "GET", &uri, Some("alice"), None).await;
    let types: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["ROOM_CREATED"]);

    let uri = format!("/rooms/{room}/messages?types=NOT_A_TYPE");
    let (status, _) = call(&app, "GET", &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn outsiders_are_forbidden() {
    let app = app();
    let room = open_room(&app, "alice", "bob").await;

    let (status, _) = call(&app, "GET", &format!("/rooms/{room}"), Some("mallory"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/rooms/{room}/messages"),
        Some("mallory"),
        Some(json!({ "content": "let me in" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let missing = uuid::Uuid::new_v4();
    let (status, _) = call(&app, "GET", &format!("/rooms/{missing}"), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unread_counts_and_read_receipts() {
    let app = app();
    let room = open_room(&app, "alice", "bob").await;

    let mut ids = Vec::new();
    for content in ["one", "two", "three"] {
        let (_, body) = call(
            &app,
            "POST",
            &format!("/rooms/{room}/messages"),
            Some("alice"),
            Some(json!({ "content": content })),
        )
        .await;
        ids.push(body["message"]["id"].clone());
    }

    let (_, unread) = call(&app, "GET", "/unread", Some("bob"), None).await;
    assert_eq!(unread["counts"][&room], 3);

    let first = ids[0].clone();
    let (status, body) = call(
        &app,
        "POST",
        &format!("/rooms/{room}/messages/read"),
        Some("bob"),
        Some(json!({ "message_ids": [first] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);

    // Alice cannot mark her own outgoing messages as read.
    let (_, body) = call(
        &app,
        "POST",
        &format!("/rooms/{room}/messages/read"),
        Some("alice"),
        Some(json!({ "message_ids": ids })),
    )
    .await;
    assert_eq!(body["updated"], 0);

    let (_, body) = call(&app, "POST", &format!("/rooms/{room}/read"), Some("bob"), None).await;
    assert_eq!(body["updated"], 2);

    let (_, unread) = call(&app, "GET", "/unread", Some("bob"), None).await;
    assert!(unread["counts"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn room_list_orders_by_activity() {
    let app = app();
    let with_bob = open_room(&app, "alice", "bob").await;
    let with_carol = open_room(&app, "alice", "carol").await;

    call(&app, "POST", &format!("/rooms/{with_bob}/messages"), Some("bob"), Some(json!({ "content": "ping" }))).await;

    let (status, page) = call(&app, "GET", "/rooms?size=1", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"][0]["room_id"], with_bob.as_str());
    assert_eq!(page["items"][0]["unread_count"], 1);
    assert_eq!(page["has_next"], true);

    let cursor = page["next_cursor"].as_str().unwrap();
    let (_, next) = call(&app, "GET", &format!("/rooms?size=1&cursor={cursor}"), Some("alice"), None).await;
    assert_eq!(next["items"][0]["room_id"], with_carol.as_str());
    assert_eq!(next["items"][0]["counterpart_id"], "carol");
    assert_eq!(next["has_next"], false);
}
