mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use house_api::gateway::OnlineSession;

#[tokio::test]
async fn presence_reflects_hub_state() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = ctx.token(1, "alice");

    let resp = server
        .get("/api/v1/users/2/online")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["user_id"], 2);
    assert_eq!(body["online"], false);

    let (session, _outbound) = OnlineSession::new(2, "bob", 8);
    ctx.state.hub.register(session).await.unwrap();

    let resp = server
        .get("/api/v1/users/2/online")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .await;
    assert_eq!(resp.json::<serde_json::Value>()["online"], true);
}

#[tokio::test]
async fn presence_requires_auth() {
    let (app, _ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/api/v1/users/2/online").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_online_count() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let (session, _outbound) = OnlineSession::new(9, "ivy", 8);
    ctx.state.hub.register(session).await.unwrap();

    let resp = server.get("/health").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["online"], 1);
}

#[tokio::test]
async fn openapi_document_lists_routes() {
    let (app, _ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/api-docs/openapi.json").await;
    resp.assert_status_ok();
    let doc: serde_json::Value = resp.json();
    for path in [
        "/health",
        "/api/v1/messages",
        "/api/v1/messages/unread",
        "/api/v1/messages/read",
        "/api/v1/users/{user_id}/online",
        "/api/v1/experience",
    ] {
        assert!(doc["paths"][path].is_object(), "missing {path}");
    }
}
