use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/users/{user_id}/online", get(get_presence))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PresenceResponse {
    pub user_id: i64,
    pub online: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/online",
    tag = "Users",
    params(("user_id" = i64, Path, description = "User to look up")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Whether the user has a live chat connection", body = PresenceResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorBody),
        (status = 503, description = "Hub unavailable", body = crate::error::ApiErrorBody),
    )
)]
pub async fn get_presence(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<PresenceResponse>, ApiError> {
    let online = state.hub.is_online(user_id).await?;
    Ok(Json(PresenceResponse { user_id, online }))
}
