#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

use house_api::auth::tokens::JwtKeys;
use house_api::config::{Config, HubConfig, QueueConfig};
use house_api::db::messages::MemoryMessageStore;
use house_api::experience::memory::MemoryQueue;
use house_api::experience::ExperiencePublisher;
use house_api::gateway::Hub;
use house_api::AppState;

pub const TEST_SECRET: &str = "test-secret-do-not-use-in-production";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything a test needs to drive the app and inspect its collaborators.
pub struct TestContext {
    pub state: AppState,
    pub keys: Arc<JwtKeys>,
    pub messages: Arc<MemoryMessageStore>,
    pub queue: MemoryQueue,
}

impl TestContext {
    pub fn token(&self, user_id: i64, username: &str) -> String {
        self.keys.issue(user_id, username).expect("issue token")
    }

    pub fn service_token(&self) -> String {
        self.keys
            .issue_with_role(1000, "post-service", "service")
            .expect("issue token")
    }

    /// Poll the hub until `user_id` is (or is not) registered.
    pub async fn wait_online(&self, user_id: i64, online: bool) {
        time::timeout(Duration::from_secs(5), async {
            while self.state.hub.is_online(user_id).await.expect("hub running") != online {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timeout waiting for presence change");
    }
}

/// Build app state over in-memory stores, a memory queue and a running hub.
pub fn test_context() -> TestContext {
    let config = Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        port: 0,
        hub: HubConfig::default(),
        queue: QueueConfig::with_url("amqp://unused"),
    };

    let (hub, hub_handle) = Hub::new(&config.hub);
    tokio::spawn(hub.run());

    let keys = Arc::new(JwtKeys::from_secret(&config.jwt_secret));
    let messages = Arc::new(MemoryMessageStore::new());
    let queue = MemoryQueue::new();
    let publisher = ExperiencePublisher::new(Arc::new(queue.clone()), config.queue.publish_timeout);

    let state = AppState {
        config: Arc::new(config),
        keys: keys.clone(),
        hub: hub_handle,
        messages: messages.clone(),
        publisher,
    };

    TestContext {
        state,
        keys,
        messages,
        queue,
    }
}

/// Build the full router over a fresh test context.
pub fn test_app() -> (Router, TestContext) {
    let ctx = test_context();
    let app = house_api::routes::router().with_state(ctx.state.clone());
    (app, ctx)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background.
pub async fn start_server() -> (SocketAddr, TestContext) {
    let (app, ctx) = test_app();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, ctx)
}

/// Open a chat connection for `user_id` and wait until the hub has it.
pub async fn connect_chat(addr: SocketAddr, ctx: &TestContext, user_id: i64, username: &str) -> WsClient {
    let token = ctx.token(user_id, username);
    let url = format!("ws://{addr}/api/v1/ws/chat?token={token}");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ctx.wait_online(user_id, true).await;
    ws
}

/// Next text frame as JSON, skipping control frames.
pub async fn next_json(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("frame is JSON");
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

/// Assert nothing but control frames arrive within `wait`.
pub async fn assert_silent(ws: &mut WsClient, wait: Duration) {
    let deadline = time::Instant::now() + wait;
    loop {
        match time::timeout_at(deadline, ws.next()).await {
            Err(_elapsed) => return,
            Ok(Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected silence, got {other:?}"),
        }
    }
}
