pub mod experience;
pub mod health;
pub mod messages;
pub mod users;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(messages::router())
        .merge(users::router())
        .merge(experience::router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Messages
        messages::list_messages,
        messages::unread_count,
        messages::mark_read,
        // Users
        users::get_presence,
        // Experience
        experience::award_experience,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            // Models
            crate::models::message::Message,
            // Route request/response types
            health::HealthResponse,
            messages::ListMessagesResponse,
            messages::UnreadCountResponse,
            messages::MarkReadRequest,
            messages::MarkReadResponse,
            users::PresenceResponse,
            experience::AwardRequest,
            experience::AwardResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Messages", description = "Private message history"),
        (name = "Users", description = "Chat presence"),
        (name = "Experience", description = "Experience awards"),
    )
)]
pub struct ApiDoc;
