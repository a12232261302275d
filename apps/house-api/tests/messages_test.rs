mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use house_api::db::messages::MessageStore;

// ---------------------------------------------------------------------------
// GET /api/v1/messages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_returns_conversation_newest_first() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    ctx.messages.create_message(1, 2, "first").await.unwrap();
    ctx.messages.create_message(2, 1, "second").await.unwrap();
    ctx.messages.create_message(1, 3, "elsewhere").await.unwrap();
    ctx.messages.create_message(1, 2, "third").await.unwrap();

    let resp = server
        .get("/api/v1/messages?user_id=2&page=1&size=2")
        .add_header(AUTHORIZATION, format!("Bearer {}", ctx.token(1, "alice")))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 1);
    assert_eq!(body["size"], 2);
    let list = body["list"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["content"], "third");
    assert_eq!(list[1]["content"], "second");
}

#[tokio::test]
async fn list_clamps_page_size() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .get("/api/v1/messages?user_id=2&size=5000")
        .add_header(AUTHORIZATION, format!("Bearer {}", ctx.token(1, "alice")))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["size"], 100);
    assert_eq!(body["page"], 1);
}

#[tokio::test]
async fn list_without_user_returns_conversations() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    ctx.messages.create_message(1, 2, "hi bob").await.unwrap();
    ctx.messages.create_message(3, 1, "hi alice").await.unwrap();
    ctx.messages.create_message(2, 1, "hey back").await.unwrap();
    ctx.messages.create_message(2, 3, "someone else").await.unwrap();

    let resp = server
        .get("/api/v1/messages")
        .add_header(AUTHORIZATION, format!("Bearer {}", ctx.token(1, "alice")))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total"], 2);
    let list = body["list"].as_array().unwrap();
    assert_eq!(list[0]["content"], "hey back");
    assert_eq!(list[1]["content"], "hi alice");
}

#[tokio::test]
async fn list_rejects_non_positive_user() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .get("/api/v1/messages?user_id=0")
        .add_header(AUTHORIZATION, format!("Bearer {}", ctx.token(1, "alice")))
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn list_far_page_is_empty() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    ctx.messages.create_message(1, 2, "only one").await.unwrap();

    let resp = server
        .get("/api/v1/messages?user_id=2&page=9223372036854775807&size=50")
        .add_header(AUTHORIZATION, format!("Bearer {}", ctx.token(1, "alice")))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total"], 1);
    assert!(body["list"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn list_requires_auth() {
    let (app, _ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/api/v1/messages?user_id=2").await;

    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn storage_outage_is_a_generic_500() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    ctx.messages.set_unavailable(true);

    let resp = server
        .get("/api/v1/messages?user_id=2")
        .add_header(AUTHORIZATION, format!("Bearer {}", ctx.token(1, "alice")))
        .await;

    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
}

// ---------------------------------------------------------------------------
// GET /api/v1/messages/unread, POST /api/v1/messages/read
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unread_count_and_mark_read() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = ctx.token(1, "alice");

    ctx.messages.create_message(2, 1, "a").await.unwrap();
    ctx.messages.create_message(2, 1, "b").await.unwrap();
    ctx.messages.create_message(3, 1, "c").await.unwrap();
    ctx.messages.create_message(1, 2, "mine").await.unwrap();

    let resp = server
        .get("/api/v1/messages/unread")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["count"], 3);

    let resp = server
        .post("/api/v1/messages/read")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&serde_json::json!({ "sender_id": 2 }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["updated"], 2);

    let resp = server
        .get("/api/v1/messages/unread")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    assert_eq!(resp.json::<serde_json::Value>()["count"], 1);

    // The message alice sent is untouched.
    let mine = ctx.messages.all().into_iter().find(|m| m.content == "mine").unwrap();
    assert!(!mine.is_read);
}

#[tokio::test]
async fn mark_read_rejects_missing_sender() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/messages/read")
        .add_header(AUTHORIZATION, format!("Bearer {}", ctx.token(1, "alice")))
        .json(&serde_json::json!({ "sender_id": 0 }))
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
}
