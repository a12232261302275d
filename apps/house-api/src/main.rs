use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use house_common::LevelTable;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use house_api::auth::tokens::JwtKeys;
use house_api::config::Config;
use house_api::db::levels::PgLevelStore;
use house_api::db::messages::PgMessageStore;
use house_api::experience::broker::Broker;
use house_api::experience::{ExperiencePublisher, LevelingProcessor};
use house_api::gateway::Hub;
use house_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let db = house_api::db::pool::connect(&config.database_url);

    let (hub, hub_handle) = Hub::new(&config.hub);
    tokio::spawn(hub.run());

    let broker = Broker::connect(&config.queue)
        .await
        .expect("failed to connect to AMQP broker");
    let sink = broker
        .publisher_sink()
        .await
        .expect("failed to open publishing channel");
    let publisher = ExperiencePublisher::new(Arc::new(sink), config.queue.publish_timeout);

    let levels = Arc::new(LevelTable::default());
    let processor = LevelingProcessor::new(Arc::new(PgLevelStore::new(db.clone(), levels.clone())))
        .with_notifications(hub_handle.clone(), levels);

    for n in 0..config.queue.consumers {
        let tag = format!("house-leveling-{n}");
        let deliveries = broker
            .consumer(&tag)
            .await
            .expect("failed to start exp consumer");
        let processor = processor.clone();
        tokio::spawn(async move { processor.run(deliveries).await });
    }

    tracing::info!(
        consumers = config.queue.consumers,
        queue = %config.queue.queue,
        "leveling consumers started"
    );

    let state = AppState {
        keys: Arc::new(JwtKeys::from_secret(&config.jwt_secret)),
        hub: hub_handle,
        messages: Arc::new(PgMessageStore::new(db)),
        publisher,
        config: Arc::new(config),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(house_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "house-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    broker.close().await;
    tracing::info!("house-api stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(%e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
