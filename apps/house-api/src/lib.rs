pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod experience;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use auth::tokens::JwtKeys;
use config::Config;
use db::messages::MessageStore;
use experience::ExperiencePublisher;
use gateway::HubHandle;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub keys: Arc<JwtKeys>,
    pub hub: HubHandle,
    pub messages: Arc<dyn MessageStore>,
    pub publisher: ExperiencePublisher,
}
