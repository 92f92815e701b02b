//! HTTP routes exercised through the router with `tower::ServiceExt::oneshot`

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tower::ServiceExt;

use common::{Harness, ALICE, BOB};
use pigeon::backend::realtime::{ConnectionHandle, Frame};
use pigeon::backend::routes::create_router;
use pigeon::shared::ChatMessage;

fn router(harness: &Harness) -> Router {
    create_router(harness.state.clone())
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_message(token: &str, username: &str, content: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/chat/{}", username))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("content={}", content)))
        .unwrap()
}

fn get(token: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new().await;
    let response = router(&harness)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_routes_require_token() {
    let harness = Harness::new().await;
    let request = Request::builder()
        .uri("/api/messages")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router(&harness), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    let (status, _) = send(router(&harness), get("forged.token.value", "/api/messages")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_send_then_read_history() {
    let harness = Harness::new().await;
    let alice = harness.token(ALICE);

    let (status, body) = send(router(&harness), post_message(&alice, "bob", "hello+bob")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messageID"], 1);
    assert_eq!(body["message"], "Message sent successfully");

    let (status, body) = send(router(&harness), get(&alice, "/api/chat/bob")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentUsername"]["username"], "alice");
    assert_eq!(body["userInfos"]["username"], "bob");
    assert_eq!(body["userInfos"]["iconBase64"], "iVBORw==");

    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "hello bob");
    assert_eq!(messages[0]["sessionFlag"], true);
    assert_eq!(messages[0]["author"]["username"], "alice");
    assert_eq!(messages[0]["hourMinute"].as_str().unwrap().len(), 5);

    // Same conversation from the other side
    let bob = harness.token(BOB);
    let (_, body) = send(router(&harness), get(&bob, "/api/chat/alice")).await;
    assert_eq!(body["messages"][0]["sessionFlag"], false);
}

#[tokio::test]
async fn test_send_rejections() {
    let harness = Harness::new().await;
    let alice = harness.token(ALICE);

    let (status, body) = send(router(&harness), post_message(&alice, "bob", "")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Values are missing!");

    let (status, _) = send(router(&harness), post_message(&alice, "nobody", "hi")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(harness.store.message_count().await, 0);
}

#[tokio::test]
async fn test_http_send_is_delivered_live() {
    let harness = Harness::new().await;
    let (handle, mut rx) = ConnectionHandle::new(BOB, 8);
    harness.state.registry().register(handle).await;

    let alice = harness.token(ALICE);
    let (status, _) = send(router(&harness), post_message(&alice, "bob", "ping")).await;
    assert_eq!(status, StatusCode::OK);

    let frame = tokio::time::timeout(common::PATIENCE, rx.recv())
        .await
        .unwrap()
        .unwrap();
    let Frame::Text(text) = frame else {
        panic!("expected text frame");
    };
    let message = ChatMessage::decode(&text).unwrap();
    assert_eq!((message.sender, message.content.as_str()), (ALICE, "ping"));
}

#[tokio::test]
async fn test_conversation_list() {
    let harness = Harness::new().await;
    let alice = harness.token(ALICE);
    let bob = harness.token(BOB);
    let carol = harness.token(common::CAROL);

    send(router(&harness), post_message(&alice, "bob", "first")).await;
    send(router(&harness), post_message(&carol, "alice", "hey")).await;
    send(router(&harness), post_message(&bob, "alice", "latest")).await;

    let (status, body) = send(router(&harness), get(&alice, "/api/messages")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentUsername"]["username"], "alice");

    let chats = body["chats"].as_array().unwrap();
    let summary: Vec<(&str, &str)> = chats
        .iter()
        .map(|c| {
            (
                c["partner"]["username"].as_str().unwrap(),
                c["content"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(summary, vec![("bob", "latest"), ("carol", "hey")]);
}
