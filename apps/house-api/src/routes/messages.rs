//! Private message history endpoints. Sending happens over the chat socket.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::models::message::Message;
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;
/// Keeps `(page - 1) * size` within `i64`.
const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/messages", get(list_messages))
        .route("/api/v1/messages/unread", get(unread_count))
        .route("/api/v1/messages/read", post(mark_read))
}

// ---------------------------------------------------------------------------
// GET /api/v1/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListMessagesParams {
    /// The other participant of the conversation. Without it the caller's
    /// conversation list is returned instead.
    pub user_id: Option<i64>,
    /// 1-based page number.
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// A conversation page, or with no `user_id` the latest message of every
/// conversation (then `page` is 1 and `size` the number of conversations).
#[derive(Debug, Serialize, ToSchema)]
pub struct ListMessagesResponse {
    pub list: Vec<Message>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/messages",
    tag = "Messages",
    params(ListMessagesParams),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "One page of the conversation, or the conversation list, newest first", body = ListMessagesResponse),
        (status = 400, description = "Invalid user_id", body = crate::error::ApiErrorBody),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorBody),
    )
)]
pub async fn list_messages(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListMessagesParams>,
) -> Result<Json<ListMessagesResponse>, ApiError> {
    let Some(other_id) = params.user_id else {
        let list = state.messages.list_conversations(user.user_id).await?;
        let total = list.len() as i64;
        return Ok(Json(ListMessagesResponse {
            list,
            total,
            page: 1,
            size: total,
        }));
    };
    if other_id <= 0 {
        return Err(ApiError::bad_request("user_id must be positive"));
    }

    let page = params.page.unwrap_or(1).clamp(1, MAX_PAGE);
    let size = params
        .size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let (list, total) = state
        .messages
        .list_conversation(user.user_id, other_id, page, size)
        .await?;

    Ok(Json(ListMessagesResponse {
        list,
        total,
        page,
        size,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/messages/unread
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/messages/unread",
    tag = "Messages",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Unread messages addressed to the caller", body = UnreadCountResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorBody),
    )
)]
pub async fn unread_count(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let count = state.messages.count_unread(user.user_id).await?;
    Ok(Json(UnreadCountResponse { count }))
}

// ---------------------------------------------------------------------------
// POST /api/v1/messages/read
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkReadRequest {
    pub sender_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkReadResponse {
    pub updated: usize,
}

#[utoipa::path(
    post,
    path = "/api/v1/messages/read",
    tag = "Messages",
    request_body = MarkReadRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Messages from sender_id marked read", body = MarkReadResponse),
        (status = 400, description = "Invalid sender_id", body = crate::error::ApiErrorBody),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorBody),
    )
)]
pub async fn mark_read(
    user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    if body.sender_id <= 0 {
        return Err(ApiError::bad_request("sender_id is required"));
    }
    let updated = state.messages.mark_read(user.user_id, body.sender_id).await?;
    Ok(Json(MarkReadResponse { updated }))
}
